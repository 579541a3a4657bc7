//! Records advertised for one HAP bridge.

use crate::record::{RData, RecordType, ResourceRecord, Srv, CLASS_IN};
use crate::HAP_SERVICE_TYPE;
use base64::Engine;
use hap_core::types::HAP_PROTOCOL_SHORT_VERSION;
use hap_core::{AccessoryCategory, BridgeConfig, DeviceId, Result};
use sha2::{Digest, Sha512};
use std::net::Ipv4Addr;

const PTR_TTL: u32 = 4500;
const TXT_TTL: u32 = 4500;
const SRV_TTL: u32 = 120;
const A_TTL: u32 = 120;

/// Service records of the bridge, rebuilt whenever paired state changes.
#[derive(Debug, Clone)]
pub struct HapZone {
    instance: String,
    host: String,
    port: u16,
    address: Ipv4Addr,
    model: String,
    device_id: DeviceId,
    setup_hash: String,
    version: u32,
    paired: bool,
    records: Vec<ResourceRecord>,
}

impl HapZone {
    pub fn build(config: &BridgeConfig, address: Ipv4Addr, paired: bool) -> Result<Self> {
        let device_id = config.device_id()?;
        let short = device_id.short();
        let name = sanitize_name(&config.name);

        let mut zone = Self {
            instance: format!("{} {}.{}", name, short, HAP_SERVICE_TYPE),
            host: format!("{}-{}.local.", host_label(&name), short),
            port: config.port,
            address,
            model: config.model.clone(),
            device_id,
            setup_hash: setup_hash(&config.setup_id, &device_id),
            version: config.version,
            paired,
            records: Vec::new(),
        };
        zone.records = zone.create_records();
        Ok(zone)
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn records(&self) -> &[ResourceRecord] {
        &self.records
    }

    pub fn is_paired(&self) -> bool {
        self.paired
    }

    /// Update the `sf` flag. Returns true when the records changed.
    pub fn set_paired(&mut self, paired: bool) -> bool {
        if self.paired == paired {
            return false;
        }
        self.paired = paired;
        self.records = self.create_records();
        true
    }

    pub fn set_address(&mut self, address: Ipv4Addr) {
        self.address = address;
        self.records = self.create_records();
    }

    fn create_records(&self) -> Vec<ResourceRecord> {
        vec![
            ResourceRecord::new(
                HAP_SERVICE_TYPE,
                CLASS_IN,
                PTR_TTL,
                RData::Ptr(self.instance.clone()),
            ),
            ResourceRecord::new(
                self.instance.clone(),
                CLASS_IN,
                SRV_TTL,
                RData::Srv(Srv {
                    priority: 0,
                    weight: 0,
                    port: self.port,
                    target: self.host.clone(),
                }),
            ),
            ResourceRecord::new(
                self.instance.clone(),
                CLASS_IN,
                TXT_TTL,
                RData::Txt(self.txt()),
            ),
            ResourceRecord::new(self.host.clone(), CLASS_IN, A_TTL, RData::A(self.address)),
        ]
    }

    fn txt(&self) -> Vec<String> {
        vec![
            format!("md={}", self.model),
            format!("pv={}", HAP_PROTOCOL_SHORT_VERSION),
            format!("id={}", self.device_id.to_mac_string()),
            format!("c#={}", self.version),
            "s#=1".to_string(),
            "ff=0".to_string(),
            format!("ci={}", AccessoryCategory::Bridge.value()),
            format!("sf={}", if self.paired { 0 } else { 1 }),
            format!("sh={}", self.setup_hash),
        ]
    }

    /// Records answering the given questions.
    pub fn answers(&self, questions: &[ResourceRecord]) -> Vec<ResourceRecord> {
        let mut answers: Vec<ResourceRecord> = Vec::new();

        for question in questions {
            for record in &self.records {
                let matches = question.rtype == RecordType::Any
                    || (record.rtype == question.rtype
                        && record.name_matches(&question.name)
                        && record.class_matches(question.class));

                if matches && !answers.contains(record) {
                    answers.push(record.clone());
                }
            }
        }

        answers
    }

    /// Records a resolver needs next: SRV and TXT for answered PTRs, then
    /// addresses of every SRV target.
    pub fn additionals(&self, answers: &[ResourceRecord]) -> Vec<ResourceRecord> {
        let mut additionals: Vec<ResourceRecord> = Vec::new();

        let push = |record: &ResourceRecord, list: &mut Vec<ResourceRecord>| {
            if !answers.contains(record) && !list.contains(record) {
                list.push(record.clone());
            }
        };

        for answer in answers {
            if let Some(RData::Ptr(target)) = &answer.rdata {
                for record in self.records.iter().filter(|r| {
                    matches!(r.rtype, RecordType::Srv | RecordType::Txt) && r.name_matches(target)
                }) {
                    push(record, &mut additionals);
                }
            }
        }

        let targets: Vec<String> = answers
            .iter()
            .chain(additionals.iter())
            .filter_map(|r| match &r.rdata {
                Some(RData::Srv(srv)) => Some(srv.target.clone()),
                _ => None,
            })
            .collect();

        for target in targets {
            for record in self.records.iter().filter(|r| {
                matches!(r.rtype, RecordType::A | RecordType::Aaaa) && r.name_matches(&target)
            }) {
                push(record, &mut additionals);
            }
        }

        additionals
    }
}

/// Replace characters DNS-SD names should not carry with spaces.
pub fn sanitize_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect();

    replaced
        .trim_matches(|c| c == ' ' || c == '-')
        .to_string()
}

fn host_label(name: &str) -> String {
    let mut label = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c == ' ' { '-' } else { c };
        if c == '-' && label.ends_with('-') {
            continue;
        }
        label.push(c);
    }
    label
}

/// `sh` TXT value: first four bytes of SHA-512(setup id || device id).
pub fn setup_hash(setup_id: &str, device_id: &DeviceId) -> String {
    let digest = Sha512::new()
        .chain_update(setup_id.as_bytes())
        .chain_update(device_id.to_mac_string().as_bytes())
        .finalize();
    base64::engine::general_purpose::STANDARD.encode(&digest[..4])
}
