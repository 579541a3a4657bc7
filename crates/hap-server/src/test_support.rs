//! Fixtures shared by the server tests.

use crate::exchange::MemoryExchange;
use crate::http::{HttpRequest, Method};
use crate::router::Router;
use crate::subscriber::Subscriber;
use hap_core::config::{AccessoryConfig, BridgeConfig, CharacteristicConfig, PropertyConfig, ServiceConfig};
use hap_core::{AccessoryCategory, ClientPermission, DeviceId, PropertyType};
use hap_crypto::chacha::{encrypt_with_nonce, nonce_from_string};
use hap_crypto::{hkdf, EcdhKeyPair, IdentityKeyPair, SessionCipher, Tlv8, TlvState, TlvType};
use hap_model::{Bridge, Catalog, Loader, ObjectId};
use hap_pairing::{AccessoryIdentity, MemoryPairingStore, Pairing, PairingStore};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

pub const PIN_CODE: &str = "031-45-154";

pub const ON_PROPERTY: Uuid = Uuid::from_u128(0x0a01);
pub const BRIGHTNESS_PROPERTY: Uuid = Uuid::from_u128(0x0a02);
pub const HUE_PROPERTY: Uuid = Uuid::from_u128(0x0a03);
pub const LOCK_PROPERTY: Uuid = Uuid::from_u128(0x0a04);
pub const RED_PROPERTY: Uuid = Uuid::from_u128(0x0a05);
pub const GREEN_PROPERTY: Uuid = Uuid::from_u128(0x0a06);
pub const BLUE_PROPERTY: Uuid = Uuid::from_u128(0x0a07);

fn property(id: Uuid, kind: PropertyType) -> Option<PropertyConfig> {
    Some(PropertyConfig {
        id,
        kind,
        format: None,
        min: None,
        max: None,
        step: None,
    })
}

fn characteristic(name: &str, property: Option<PropertyConfig>, value: serde_json::Value) -> CharacteristicConfig {
    CharacteristicConfig {
        name: name.to_string(),
        property,
        value: Some(value),
    }
}

fn single_accessory(name: &str, category: AccessoryCategory, service: ServiceConfig) -> BridgeConfig {
    BridgeConfig {
        accessories: vec![AccessoryConfig {
            id: None,
            name: name.to_string(),
            aid: Some(2),
            category,
            services: vec![service],
        }],
        ..Default::default()
    }
}

/// Bridge with one lamp at aid 2: `On` is dynamic, `Brightness` mapped and
/// `Hue` variable.
pub fn bridge() -> Bridge {
    let config = single_accessory(
        "Lamp",
        AccessoryCategory::LightBulb,
        ServiceConfig {
            service_type: "Lightbulb".to_string(),
            primary: true,
            hidden: false,
            characteristics: vec![
                characteristic("On", property(ON_PROPERTY, PropertyType::Dynamic), json!(false)),
                characteristic(
                    "Brightness",
                    property(BRIGHTNESS_PROPERTY, PropertyType::Mapped),
                    json!(100),
                ),
                characteristic("Hue", property(HUE_PROPERTY, PropertyType::Variable), json!(0.0)),
            ],
        },
    );

    Loader::new(Arc::new(Catalog::bundled().unwrap()))
        .load(&config)
        .unwrap()
}

/// Bridge with a color lamp at aid 2. Hue, saturation and brightness are
/// unbound while the RGB channels are reported by the device.
pub fn color_bridge() -> Bridge {
    let config = single_accessory(
        "Strip",
        AccessoryCategory::LightBulb,
        ServiceConfig {
            service_type: "Lightbulb".to_string(),
            primary: true,
            hidden: false,
            characteristics: vec![
                characteristic("On", None, json!(true)),
                characteristic("Brightness", None, json!(100)),
                characteristic("Hue", None, json!(0.0)),
                characteristic("Saturation", None, json!(100.0)),
                characteristic("ColorRed", property(RED_PROPERTY, PropertyType::Dynamic), json!(0)),
                characteristic("ColorGreen", property(GREEN_PROPERTY, PropertyType::Dynamic), json!(0)),
                characteristic("ColorBlue", property(BLUE_PROPERTY, PropertyType::Dynamic), json!(0)),
            ],
        },
    );

    Loader::new(Arc::new(Catalog::bundled().unwrap()))
        .load(&config)
        .unwrap()
}

/// Bridge with a lock at aid 2 whose target state needs timed writes.
pub fn timed_bridge() -> Bridge {
    let services = r#"{
        "AccessoryInformation": {"UUID": "3E", "RequiredCharacteristics": ["Identify", "Manufacturer", "Model", "Name", "SerialNumber", "FirmwareRevision"]},
        "ProtocolInformation": {"UUID": "A2", "RequiredCharacteristics": ["Version"]},
        "LockMechanism": {"UUID": "45", "RequiredCharacteristics": ["LockTargetState"]}
    }"#;
    let characteristics = r#"{
        "Identify": {"UUID": "14", "Format": "bool", "Permissions": ["pw"]},
        "Manufacturer": {"UUID": "20", "Format": "string", "Permissions": ["pr"]},
        "Model": {"UUID": "21", "Format": "string", "Permissions": ["pr"]},
        "Name": {"UUID": "23", "Format": "string", "Permissions": ["pr"]},
        "SerialNumber": {"UUID": "30", "Format": "string", "Permissions": ["pr"]},
        "FirmwareRevision": {"UUID": "52", "Format": "string", "Permissions": ["pr"]},
        "Version": {"UUID": "37", "Format": "string", "Permissions": ["pr", "ev"]},
        "LockTargetState": {"UUID": "1E", "Format": "uint8", "Permissions": ["pr", "pw", "ev", "tw"], "MinValue": 0, "MaxValue": 1, "MinStep": 1}
    }"#;

    let config = single_accessory(
        "Door",
        AccessoryCategory::DoorLock,
        ServiceConfig {
            service_type: "LockMechanism".to_string(),
            primary: true,
            hidden: false,
            characteristics: vec![characteristic(
                "LockTargetState",
                property(LOCK_PROPERTY, PropertyType::Mapped),
                json!(0),
            )],
        },
    );

    let catalog = Catalog::from_json(services, characteristics).unwrap();
    Loader::new(Arc::new(catalog)).load(&config).unwrap()
}

/// Instance id of a characteristic looked up by service and name.
pub fn iid(bridge: &Bridge, aid: u64, service: &str, characteristic: &str) -> u64 {
    let accessory = bridge.find_accessory(aid).unwrap();
    let service_index = accessory
        .services()
        .iter()
        .position(|s| s.name() == service)
        .unwrap();
    let index = accessory.services()[service_index]
        .position(characteristic)
        .unwrap();

    accessory
        .iid(&ObjectId::Characteristic {
            service: service_index,
            index,
        })
        .unwrap()
}

pub fn identity() -> AccessoryIdentity {
    AccessoryIdentity::generate(DeviceId::from_mac_string("0E:9A:5F:21:33:7C").unwrap())
}

/// Controller side of pair-verify.
pub struct Controller {
    identifier: &'static str,
    long_term: IdentityKeyPair,
    ephemeral: EcdhKeyPair,
}

impl Controller {
    pub fn new(identifier: &'static str) -> Self {
        Self {
            identifier,
            long_term: IdentityKeyPair::generate(),
            ephemeral: EcdhKeyPair::generate(),
        }
    }

    pub fn pairing(&self) -> Pairing {
        Pairing::new(self.identifier, self.long_term.public_key(), ClientPermission::Admin)
    }

    pub fn m1(&self) -> Vec<u8> {
        Tlv8::new()
            .with_state(TlvState::M1)
            .with_bytes(TlvType::PublicKey, self.ephemeral.public_key().to_vec())
            .encode()
            .unwrap()
    }

    /// M3 answering the accessory's M2. The accessory proof is not checked.
    pub fn m3(&self, m2: &[u8]) -> Vec<u8> {
        self.m3_with_secret(m2).0
    }

    pub fn m3_with_secret(&self, m2: &[u8]) -> (Vec<u8>, [u8; 32]) {
        let m2 = Tlv8::parse(m2).unwrap();
        let accessory_public: [u8; 32] = m2.get_bytes(TlvType::PublicKey).unwrap().try_into().unwrap();
        let shared = self.ephemeral.diffie_hellman(&accessory_public).unwrap();
        let key = hkdf::derive_pair_verify_key(&shared).unwrap();

        let mut info = self.ephemeral.public_key().to_vec();
        info.extend_from_slice(self.identifier.as_bytes());
        info.extend_from_slice(&accessory_public);
        let sub_tlv = Tlv8::new()
            .with_text(TlvType::Identifier, self.identifier)
            .with_bytes(TlvType::Signature, self.long_term.sign(&info).to_vec())
            .encode()
            .unwrap();
        let encrypted = encrypt_with_nonce(&key, &nonce_from_string(b"PV-Msg03"), &sub_tlv).unwrap();

        let m3 = Tlv8::new()
            .with_state(TlvState::M3)
            .with_bytes(TlvType::EncryptedData, encrypted)
            .encode()
            .unwrap();
        (m3, shared)
    }
}

pub struct Harness {
    pub router: Rc<Router>,
    pub store: Arc<MemoryPairingStore>,
    pub exchange: Arc<MemoryExchange>,
}

/// Router over [`bridge`] with in-memory pairing and device state.
pub fn harness() -> Harness {
    let store = Arc::new(MemoryPairingStore::new());
    let exchange = Arc::new(MemoryExchange::new());
    let (paired, _) = watch::channel(false);
    let router = Router::new(
        Rc::new(RefCell::new(bridge())),
        Rc::new(RefCell::new(Subscriber::new())),
        identity(),
        store.clone(),
        exchange.clone(),
        PIN_CODE,
        paired,
    );

    Harness {
        router: Rc::new(router),
        store,
        exchange,
    }
}

/// Pair a controller and run pair-verify on `connection` through the router.
pub async fn verify(harness: &Harness, connection: u64) -> SessionCipher {
    let controller = Controller::new("iPhone");
    harness.store.add(controller.pairing()).await.unwrap();
    harness.store.set_paired(true).await.unwrap();

    let m1 = HttpRequest::new(Method::Post, "/pair-verify").with_body(controller.m1());
    let m2 = harness.router.handle(connection, m1).await.response.body;
    let m3 = HttpRequest::new(Method::Post, "/pair-verify").with_body(controller.m3(&m2));

    let reply = harness.router.handle(connection, m3).await;
    assert_eq!(Tlv8::parse(&reply.response.body).unwrap().state(), Some(4));
    reply.cipher.expect("verified connection switches to encryption")
}
