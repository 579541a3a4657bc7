//! Color representations of a light bulb and their reconciliation.
//!
//! A color light keeps RGB(W) channels for the device (virtual
//! characteristics) and hue/saturation/brightness for controllers. A write
//! to either side recomputes the other.

use crate::service::Service;
use serde_json::{json, Value};

pub const COLOR_RED: &str = "ColorRed";
pub const COLOR_GREEN: &str = "ColorGreen";
pub const COLOR_BLUE: &str = "ColorBlue";
pub const COLOR_WHITE: &str = "ColorWhite";
pub const HUE: &str = "Hue";
pub const SATURATION: &str = "Saturation";
pub const BRIGHTNESS: &str = "Brightness";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub white: Option<u8>,
}

/// Hue in degrees (0..360), saturation and brightness in percent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Hsb {
    pub hue: f64,
    pub saturation: f64,
    pub brightness: u8,
}

impl Rgb {
    pub fn new(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red,
            green,
            blue,
            white: None,
        }
    }

    pub fn with_white(mut self, white: u8) -> Self {
        self.white = Some(white);
        self
    }

    /// HSB of the mixed color. A white channel lightens every component.
    pub fn to_hsb(&self) -> Hsb {
        let w = self.white.unwrap_or(0);
        let r = f64::from(self.red.saturating_add(w)) / 255.0;
        let g = f64::from(self.green.saturating_add(w)) / 255.0;
        let b = f64::from(self.blue.saturating_add(w)) / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let hue = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * ((g - b) / delta).rem_euclid(6.0)
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };

        let saturation = if max == 0.0 { 0.0 } else { delta / max * 100.0 };

        Hsb {
            hue: hue.round() % 360.0,
            saturation: saturation.round(),
            brightness: (max * 100.0).round() as u8,
        }
    }
}

impl Hsb {
    pub fn new(hue: f64, saturation: f64, brightness: u8) -> Self {
        Self {
            hue,
            saturation,
            brightness,
        }
    }

    pub fn to_rgb(&self) -> Rgb {
        let s = (self.saturation / 100.0).clamp(0.0, 1.0);
        let v = (f64::from(self.brightness) / 100.0).clamp(0.0, 1.0);
        let h = self.hue.rem_euclid(360.0) / 60.0;

        let c = v * s;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let m = v - c;

        let (r, g, b) = match h as u8 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        let channel = |value: f64| ((value + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Rgb::new(channel(r), channel(g), channel(b))
    }

    /// RGBW channels driven at `intensity` percent.
    ///
    /// The unsaturated share of the color goes to the white channel and all
    /// four channels scale with the intensity instead of `self.brightness`.
    pub fn to_rgbw(&self, intensity: u8) -> Rgb {
        let full = Hsb::new(self.hue, self.saturation, 100).to_rgb();
        let white = full.red.min(full.green).min(full.blue);
        let scale = f64::from(intensity.min(100)) / 100.0;
        let channel = |value: u8| (f64::from(value) * scale).round() as u8;

        Rgb::new(
            channel(full.red - white),
            channel(full.green - white),
            channel(full.blue - white),
        )
        .with_white(channel(white))
    }
}

/// Pending write produced by reconciliation: characteristic index and value.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub index: usize,
    pub value: Value,
}

/// Compute the sibling writes caused by a change of `trigger` in a light
/// bulb service. Only characteristics without a property, or whose property
/// receives updates of this direction, are written.
pub fn reconcile(service: &Service, trigger: &str, from_device: bool) -> Vec<Update> {
    match trigger {
        COLOR_RED | COLOR_GREEN | COLOR_BLUE | COLOR_WHITE => {
            rgb_to_hsb_updates(service, from_device)
        }
        HUE | SATURATION | BRIGHTNESS => hsb_to_rgb_updates(service, from_device),
        _ => Vec::new(),
    }
}

fn rgb_to_hsb_updates(service: &Service, from_device: bool) -> Vec<Update> {
    let channel = |name: &str| {
        service
            .find_characteristic(name)
            .and_then(|c| c.value().as_i64())
            .map(|v| v.clamp(0, 255) as u8)
    };

    let hsb = match (channel(COLOR_RED), channel(COLOR_GREEN), channel(COLOR_BLUE)) {
        (Some(r), Some(g), Some(b)) => {
            let mut rgb = Rgb::new(r, g, b);
            rgb.white = channel(COLOR_WHITE);
            rgb.to_hsb()
        }
        _ => Hsb::default(),
    };

    let mut updates = Vec::new();
    push_update(service, HUE, json!(hsb.hue), from_device, &mut updates);
    push_update(service, SATURATION, json!(hsb.saturation), from_device, &mut updates);
    push_update(service, BRIGHTNESS, json!(hsb.brightness), from_device, &mut updates);
    updates
}

fn hsb_to_rgb_updates(service: &Service, from_device: bool) -> Vec<Update> {
    let number = |name: &str| service.find_characteristic(name).and_then(|c| c.value().as_f64());
    let brightness = service.find_characteristic(BRIGHTNESS);

    let white = service.has_characteristic(COLOR_WHITE);

    let rgb = match (
        number(HUE),
        number(SATURATION),
        brightness.and_then(|c| c.value().as_i64()),
    ) {
        (Some(hue), Some(saturation), Some(level)) => {
            let level = level.clamp(0, 100) as u8;
            // Dimming through a separately mapped property happens on the device.
            let hsb_level = if brightness
                .and_then(|c| c.property())
                .is_some_and(|p| p.is_mapped())
            {
                100
            } else {
                level
            };
            let hsb = Hsb::new(hue, saturation, hsb_level);
            if white {
                hsb.to_rgbw(level)
            } else {
                hsb.to_rgb()
            }
        }
        _ if white => Rgb::default().with_white(0),
        _ => Rgb::default(),
    };

    let mut updates = Vec::new();
    push_update(service, COLOR_RED, json!(rgb.red), from_device, &mut updates);
    push_update(service, COLOR_GREEN, json!(rgb.green), from_device, &mut updates);
    push_update(service, COLOR_BLUE, json!(rgb.blue), from_device, &mut updates);
    if let Some(white) = rgb.white {
        push_update(service, COLOR_WHITE, json!(white), from_device, &mut updates);
    }
    updates
}

fn push_update(
    service: &Service,
    name: &str,
    value: Value,
    from_device: bool,
    updates: &mut Vec<Update>,
) {
    let Some(index) = service.position(name) else {
        return;
    };
    let Some(characteristic) = service.characteristic(index) else {
        return;
    };

    let accepts = characteristic
        .property()
        .map_or(true, |p| p.accepts_update(from_device));

    if accepts {
        updates.push(Update { index, value });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod conversions {
        use super::*;

        #[test]
        fn pure_red() {
            let hsb = Rgb::new(255, 0, 0).to_hsb();
            assert_eq!(hsb, Hsb::new(0.0, 100.0, 100));
            assert_eq!(hsb.to_rgb(), Rgb::new(255, 0, 0));
        }

        #[test]
        fn primary_and_secondary_hues() {
            assert_eq!(Rgb::new(0, 255, 0).to_hsb().hue, 120.0);
            assert_eq!(Rgb::new(0, 0, 255).to_hsb().hue, 240.0);
            assert_eq!(Rgb::new(255, 255, 0).to_hsb().hue, 60.0);
            assert_eq!(Rgb::new(255, 0, 255).to_hsb().hue, 300.0);
        }

        #[test]
        fn black_and_white() {
            assert_eq!(Rgb::new(0, 0, 0).to_hsb(), Hsb::new(0.0, 0.0, 0));
            assert_eq!(Rgb::new(255, 255, 255).to_hsb(), Hsb::new(0.0, 0.0, 100));
            assert_eq!(Hsb::new(200.0, 0.0, 100).to_rgb(), Rgb::new(255, 255, 255));
        }

        #[test]
        fn hsb_roundtrip_is_stable() {
            for hue in (0..360).step_by(15) {
                for saturation in [25.0, 50.0, 100.0] {
                    let hsb = Hsb::new(f64::from(hue), saturation, 100);
                    let back = hsb.to_rgb().to_hsb();
                    assert!((back.hue - hsb.hue).abs() <= 1.0, "{:?} -> {:?}", hsb, back);
                    assert!((back.saturation - hsb.saturation).abs() <= 1.0);
                    assert_eq!(back.brightness, hsb.brightness);
                }
            }
        }

        #[test]
        fn rgbw_extracts_shared_component() {
            let pastel = Hsb::new(0.0, 50.0, 100);
            assert_eq!(pastel.to_rgb(), Rgb::new(255, 128, 128));
            assert_eq!(pastel.to_rgbw(100), Rgb::new(127, 0, 0).with_white(128));
        }

        #[test]
        fn rgbw_scales_with_intensity() {
            let pastel = Hsb::new(0.0, 50.0, 100);
            assert_eq!(pastel.to_rgbw(50), Rgb::new(64, 0, 0).with_white(64));
            assert_eq!(pastel.to_rgbw(0), Rgb::new(0, 0, 0).with_white(0));
            assert_eq!(Hsb::new(120.0, 100.0, 30).to_rgbw(40), Rgb::new(0, 102, 0).with_white(0));
        }

        #[test]
        fn white_channel_lightens() {
            let hsb = Rgb::new(200, 0, 0).with_white(55).to_hsb();
            assert_eq!(hsb.brightness, 100);
            assert!(hsb.saturation < 100.0);
        }
    }
}
