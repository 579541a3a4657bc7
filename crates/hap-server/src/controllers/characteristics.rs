//! `GET /characteristics`, `PUT /characteristics` and `PUT /prepare`.

use crate::http::HttpResponse;
use crate::subscriber::Subscriber;
use hap_core::error::{Error, Result};
use hap_core::{uuid_to_hap_type, Permission, PropertyType, ServerStatus};
use hap_model::{Accessory, Bridge, ObjectId, Transformer};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Parsed `GET /characteristics` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub ids: Vec<(u64, u64)>,
    pub meta: bool,
    pub perms: bool,
    pub kind: bool,
    pub ev: bool,
}

impl ReadRequest {
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self> {
        let raw = params
            .get("id")
            .filter(|ids| !ids.is_empty())
            .ok_or_else(|| Error::invalid_argument("Missing characteristic ids"))?;

        let ids = raw
            .split(',')
            .map(|id| {
                id.split_once('.')
                    .and_then(|(aid, iid)| Some((aid.parse().ok()?, iid.parse().ok()?)))
                    .ok_or_else(|| Error::invalid_argument(format!("Invalid characteristic id: {}", id)))
            })
            .collect::<Result<Vec<_>>>()?;

        let flag = |name: &str| params.get(name).is_some_and(|v| v == "1" || v == "true");

        Ok(Self {
            ids,
            meta: flag("meta"),
            perms: flag("perms"),
            kind: flag("type"),
            ev: flag("ev"),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WriteRequest {
    characteristics: Vec<WriteItem>,
    #[serde(default)]
    pid: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WriteItem {
    aid: u64,
    iid: u64,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    ev: Option<Value>,
    #[serde(default)]
    r: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct PrepareRequest {
    ttl: u64,
    pid: u64,
}

/// A value to hand to the device behind a property.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceWrite {
    pub property: Uuid,
    pub value: Value,
}

/// Result of `PUT /characteristics`.
#[derive(Debug)]
pub struct WriteOutcome {
    pub response: HttpResponse,
    /// Device writes to perform once the accessory graph is released.
    pub device_writes: Vec<DeviceWrite>,
}

#[derive(Debug, Clone, Copy)]
struct PreparedWrite {
    pid: u64,
    deadline: Instant,
}

/// Characteristic access. Keeps the timed-write preparations of every
/// connection.
#[derive(Debug, Default)]
pub struct CharacteristicsController {
    prepared: HashMap<u64, PreparedWrite>,
}

impl CharacteristicsController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the requested characteristics.
    ///
    /// Answers 200 when every item succeeded, otherwise 207 with a status
    /// on every item.
    pub fn read(
        &self,
        bridge: &Bridge,
        subscriber: &Subscriber,
        connection: u64,
        request: &ReadRequest,
    ) -> HttpResponse {
        let mut items = Vec::with_capacity(request.ids.len());
        let mut failed = false;

        for &(aid, iid) in &request.ids {
            let mut item = Map::new();
            item.insert("aid".into(), json!(aid));
            item.insert("iid".into(), json!(iid));

            match read_one(bridge, aid, iid, request) {
                Ok(fields) => {
                    item.extend(fields);
                    if request.ev {
                        item.insert("ev".into(), json!(subscriber.is_subscribed(connection, aid, iid)));
                    }
                    item.insert("status".into(), json!(ServerStatus::Success.code()));
                }
                Err(status) => {
                    debug!(aid, iid, status = status.code(), "Characteristic read failed");
                    failed = true;
                    item.insert("status".into(), json!(status.code()));
                }
            }
            items.push(item);
        }

        if !failed {
            for item in &mut items {
                item.remove("status");
            }
        }

        let status = if failed { 207 } else { 200 };
        HttpResponse::json(status, &json!({ "characteristics": items }))
    }

    /// Apply a write request from `connection`.
    ///
    /// Values are stored as expected values and turned into device writes;
    /// `ev` toggles notifications. Answers 204 when every item succeeded and
    /// nothing was asked back, otherwise 207.
    pub fn write(
        &mut self,
        bridge: &mut Bridge,
        subscriber: &mut Subscriber,
        connection: u64,
        body: &[u8],
    ) -> Result<WriteOutcome> {
        let request: WriteRequest = serde_json::from_slice(body)?;
        let timed = request.pid.map(|pid| self.check_prepared(connection, pid));

        let mut items = Vec::with_capacity(request.characteristics.len());
        let mut device_writes = Vec::new();
        let mut multi_status = false;

        for item in &request.characteristics {
            let mut reply = Map::new();
            reply.insert("aid".into(), json!(item.aid));
            reply.insert("iid".into(), json!(item.iid));

            let status = match self.write_one(bridge, subscriber, connection, item, timed, &mut device_writes) {
                Ok(value) => {
                    if let Some(value) = value {
                        reply.insert("value".into(), value);
                        multi_status = true;
                    }
                    ServerStatus::Success
                }
                Err(status) => {
                    warn!(aid = item.aid, iid = item.iid, status = status.code(), "Characteristic write failed");
                    multi_status = true;
                    status
                }
            };
            reply.insert("status".into(), json!(status.code()));
            items.push(reply);
        }

        if request.pid.is_some() {
            self.prepared.remove(&connection);
        }

        let response = if multi_status {
            HttpResponse::json(207, &json!({ "characteristics": items }))
        } else {
            HttpResponse::no_content()
        };

        Ok(WriteOutcome {
            response,
            device_writes,
        })
    }

    /// Register a timed write for `connection`.
    pub fn prepare(&mut self, connection: u64, body: &[u8]) -> Result<HttpResponse> {
        let request: PrepareRequest = serde_json::from_slice(body)?;
        let deadline = Instant::now() + Duration::from_millis(request.ttl);

        debug!(connection, pid = request.pid, ttl = request.ttl, "Timed write prepared");
        self.prepared.insert(
            connection,
            PreparedWrite {
                pid: request.pid,
                deadline,
            },
        );

        Ok(HttpResponse::json(
            200,
            &json!({ "status": ServerStatus::Success.code() }),
        ))
    }

    /// Drop the preparation of a closed connection.
    pub fn forget(&mut self, connection: u64) {
        self.prepared.remove(&connection);
    }

    fn check_prepared(&self, connection: u64, pid: u64) -> bool {
        self.prepared
            .get(&connection)
            .is_some_and(|prepared| prepared.pid == pid && Instant::now() <= prepared.deadline)
    }

    fn write_one(
        &self,
        bridge: &mut Bridge,
        subscriber: &mut Subscriber,
        connection: u64,
        item: &WriteItem,
        timed: Option<bool>,
        device_writes: &mut Vec<DeviceWrite>,
    ) -> std::result::Result<Option<Value>, ServerStatus> {
        let accessory = bridge
            .find_accessory_mut(item.aid)
            .ok_or(ServerStatus::ResourceDoesNotExist)?;
        let object = accessory
            .object(item.iid)
            .ok_or(ServerStatus::ResourceDoesNotExist)?;
        let characteristic = accessory
            .characteristic(object)
            .ok_or(ServerStatus::ResourceDoesNotExist)?;

        let mut reply = None;

        if let Some(value) = &item.value {
            let writable = [Permission::Write, Permission::TimedWrite, Permission::WriteResponse]
                .into_iter()
                .any(|p| characteristic.has_permission(p));
            if !writable {
                return Err(ServerStatus::ReadOnlyCharacteristic);
            }

            match timed {
                None if characteristic.has_permission(Permission::TimedWrite) => {
                    return Err(ServerStatus::InvalidValueInRequest)
                }
                Some(false) => return Err(ServerStatus::InvalidValueInRequest),
                _ => {}
            }

            let value = Transformer::from_client(characteristic, value);
            let changed = apply_write(accessory, object, value, device_writes)?;
            subscriber.publish_changes(accessory, item.aid, &changed, Some(connection));

            if item.r == Some(true) {
                reply = accessory.characteristic(object).map(|c| c.client_value());
            }
        }

        if let Some(ev) = &item.ev {
            let characteristic = accessory
                .characteristic(object)
                .ok_or(ServerStatus::ResourceDoesNotExist)?;
            if !characteristic.has_permission(Permission::Notify) {
                return Err(ServerStatus::NotificationNotSupported);
            }

            if truthy(ev) {
                subscriber.subscribe(connection, item.aid, item.iid);
            } else {
                subscriber.unsubscribe(connection, item.aid, item.iid);
            }
        }

        Ok(reply)
    }
}

fn read_one(
    bridge: &Bridge,
    aid: u64,
    iid: u64,
    request: &ReadRequest,
) -> std::result::Result<Map<String, Value>, ServerStatus> {
    let characteristic = bridge
        .find_accessory(aid)
        .and_then(|accessory| accessory.characteristic_by_iid(iid))
        .ok_or(ServerStatus::ResourceDoesNotExist)?;

    if !characteristic.has_permission(Permission::Read) {
        return Err(ServerStatus::WriteOnlyCharacteristic);
    }

    let mut fields = Map::new();
    fields.insert("value".into(), characteristic.client_value());
    if request.meta {
        fields.extend(characteristic.get_meta());
    }
    if request.perms {
        let perms: Vec<&str> = characteristic
            .permissions()
            .iter()
            .map(Permission::as_str)
            .collect();
        fields.insert("perms".into(), json!(perms));
    }
    if request.kind {
        fields.insert("type".into(), json!(uuid_to_hap_type(&characteristic.type_id())));
    }
    Ok(fields)
}

/// Store a controller value and collect the device writes it causes.
///
/// Returns the characteristics whose value changed, reconciled siblings
/// included.
fn apply_write(
    accessory: &mut Accessory,
    object: ObjectId,
    value: Value,
    device_writes: &mut Vec<DeviceWrite>,
) -> std::result::Result<Vec<ObjectId>, ServerStatus> {
    let characteristic = accessory
        .characteristic(object)
        .ok_or(ServerStatus::ResourceDoesNotExist)?;
    let property = characteristic.property().cloned();

    let changed = if characteristic.is_always_null() {
        Vec::new()
    } else {
        accessory
            .set_expected_value(object, value.clone())
            .map_err(internal_failure)?
    };

    // Siblings were reconciled in the controller direction above. Settling
    // the written value must not run a device direction pass over them.
    match property {
        Some(property) if property.kind != PropertyType::Variable => {
            device_writes.push(DeviceWrite {
                property: property.id,
                value,
            })
        }
        _ => accessory.confirm_value(object).map_err(internal_failure)?,
    }

    for sibling in changed.iter().filter(|sibling| **sibling != object) {
        let Some(characteristic) = accessory.characteristic(*sibling) else {
            continue;
        };
        if let Some(property) = characteristic.property().filter(|p| p.accepts_update(false)) {
            device_writes.push(DeviceWrite {
                property: property.id,
                value: characteristic.value().clone(),
            });
        }
    }

    Ok(changed)
}

fn internal_failure(error: Error) -> ServerStatus {
    warn!(%error, "Characteristic update failed");
    ServerStatus::ServiceCommunicationFailure
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}
