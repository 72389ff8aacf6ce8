//! # Core Message Set
//!
//! The messages the runtime itself speaks: discovery (Announce, Heartbeat),
//! entity bookkeeping (EntityList, EntityInfo) and log bracketing
//! (LoggingControl). Every other type id travels as [`Payload::Unknown`] with
//! its raw bytes intact, so unmapped traffic can still be routed, logged and
//! replayed.

use crate::builder::FieldWriter;
use crate::error::{ProtocolError, ProtocolResult};
use crate::header::Header;
use crate::parser::FieldReader;
use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// A message type with a fixed type id and field layout
pub trait PayloadKind: Sized + Into<Payload> {
    const TYPE_ID: u16;
    const NAME: &'static str;

    /// Borrow `Self` out of a decoded payload, if it is of this kind
    fn from_payload(payload: &Payload) -> Option<&Self>;

    fn encode_fields(&self, out: &mut FieldWriter);

    fn decode_fields(reader: &mut FieldReader<'_>) -> ProtocolResult<Self>;
}

fn enum_field<T: TryFromPrimitive<Primitive = u8>>(
    reader: &mut FieldReader<'_>,
    type_id: u16,
    field: &str,
) -> ProtocolResult<T> {
    let offset = reader.offset();
    let raw = reader.u8(field)?;
    T::try_from_primitive(raw).map_err(|_| {
        ProtocolError::invalid_payload(type_id, offset, format!("'{}' has no value {}", field, raw))
    })
}

/// Kind of system advertised in an Announce
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive, Serialize, Deserialize,
)]
#[repr(u8)]
#[serde(rename_all = "UPPERCASE")]
pub enum SystemType {
    Ccu = 0,
    HumanSensor = 1,
    Uuv = 2,
    Usv = 3,
    Uav = 4,
    Ugv = 5,
    StaticSensor = 6,
    MobileSensor = 7,
    Wsn = 8,
}

/// Periodic multicast advertisement of a node
#[derive(Debug, Clone, PartialEq)]
pub struct Announce {
    pub sys_name: String,
    pub sys_type: SystemType,
    pub owner: u16,
    /// Latitude (rad)
    pub lat: f64,
    /// Longitude (rad)
    pub lon: f64,
    /// Height (m)
    pub height: f32,
    /// `;`-separated service URIs
    pub services: String,
}

impl Default for Announce {
    fn default() -> Self {
        Self {
            sys_name: String::new(),
            sys_type: SystemType::Ccu,
            owner: crate::constants::NULL_ID,
            lat: 0.0,
            lon: 0.0,
            height: 0.0,
            services: String::new(),
        }
    }
}

impl PayloadKind for Announce {
    const TYPE_ID: u16 = 151;
    const NAME: &'static str = "Announce";

    fn from_payload(payload: &Payload) -> Option<&Self> {
        match payload {
            Payload::Announce(m) => Some(m),
            _ => None,
        }
    }

    fn encode_fields(&self, out: &mut FieldWriter) {
        out.plaintext(&self.sys_name)
            .u8(self.sys_type.into())
            .u16(self.owner)
            .f64(self.lat)
            .f64(self.lon)
            .f32(self.height)
            .plaintext(&self.services);
    }

    fn decode_fields(reader: &mut FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            sys_name: reader.plaintext("sys_name")?,
            sys_type: enum_field(reader, Self::TYPE_ID, "sys_type")?,
            owner: reader.u16("owner")?,
            lat: reader.f64("lat")?,
            lon: reader.f64("lon")?,
            height: reader.f32("height")?,
            services: reader.plaintext("services")?,
        })
    }
}

/// Empty liveness marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Heartbeat;

impl PayloadKind for Heartbeat {
    const TYPE_ID: u16 = 150;
    const NAME: &'static str = "Heartbeat";

    fn from_payload(payload: &Payload) -> Option<&Self> {
        match payload {
            Payload::Heartbeat(m) => Some(m),
            _ => None,
        }
    }

    fn encode_fields(&self, _out: &mut FieldWriter) {}

    fn decode_fields(_reader: &mut FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum EntityListOp {
    Report = 0,
    Query = 1,
}

/// Bulk entity label → id report, or a request for one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityList {
    pub op: EntityListOp,
    /// `;`-separated `label=id` pairs
    pub list: String,
}

impl EntityList {
    pub fn query() -> Self {
        Self {
            op: EntityListOp::Query,
            list: String::new(),
        }
    }

    /// Build a REPORT, ordering entries by entity id
    pub fn report<'a>(entities: impl IntoIterator<Item = (&'a str, u8)>) -> Self {
        let mut sorted: Vec<_> = entities.into_iter().collect();
        sorted.sort_by_key(|(_, id)| *id);
        let list = sorted
            .iter()
            .map(|(label, id)| format!("{}={}", label, id))
            .collect::<Vec<_>>()
            .join(";");
        Self {
            op: EntityListOp::Report,
            list,
        }
    }

    /// Parse the `label=id` pairs; malformed entries are skipped
    pub fn entries(&self) -> Vec<(String, u8)> {
        self.list
            .split(';')
            .filter_map(|pair| {
                let (label, id) = pair.split_once('=')?;
                let id = id.trim().parse::<u8>().ok()?;
                Some((label.trim().to_string(), id))
            })
            .collect()
    }
}

impl PayloadKind for EntityList {
    const TYPE_ID: u16 = 5;
    const NAME: &'static str = "EntityList";

    fn from_payload(payload: &Payload) -> Option<&Self> {
        match payload {
            Payload::EntityList(m) => Some(m),
            _ => None,
        }
    }

    fn encode_fields(&self, out: &mut FieldWriter) {
        out.u8(self.op.into()).plaintext(&self.list);
    }

    fn decode_fields(reader: &mut FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            op: enum_field(reader, Self::TYPE_ID, "op")?,
            list: reader.plaintext("list")?,
        })
    }
}

/// Description of a single entity, sent by systems without EntityList support
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityInfo {
    pub id: u8,
    pub label: String,
    pub component: String,
    pub act_time: u16,
    pub deact_time: u16,
}

impl PayloadKind for EntityInfo {
    const TYPE_ID: u16 = 3;
    const NAME: &'static str = "EntityInfo";

    fn from_payload(payload: &Payload) -> Option<&Self> {
        match payload {
            Payload::EntityInfo(m) => Some(m),
            _ => None,
        }
    }

    fn encode_fields(&self, out: &mut FieldWriter) {
        out.u8(self.id)
            .plaintext(&self.label)
            .plaintext(&self.component)
            .u16(self.act_time)
            .u16(self.deact_time);
    }

    fn decode_fields(reader: &mut FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            id: reader.u8("id")?,
            label: reader.plaintext("label")?,
            component: reader.plaintext("component")?,
            act_time: reader.u16("act_time")?,
            deact_time: reader.u16("deact_time")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum LoggingControlOp {
    RequestStart = 0,
    Started = 1,
    RequestStop = 2,
    Stopped = 3,
    RequestCurrentName = 4,
    CurrentName = 5,
}

/// Log session bracketing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingControl {
    pub op: LoggingControlOp,
    pub name: String,
}

impl PayloadKind for LoggingControl {
    const TYPE_ID: u16 = 102;
    const NAME: &'static str = "LoggingControl";

    fn from_payload(payload: &Payload) -> Option<&Self> {
        match payload {
            Payload::LoggingControl(m) => Some(m),
            _ => None,
        }
    }

    fn encode_fields(&self, out: &mut FieldWriter) {
        out.u8(self.op.into()).plaintext(&self.name);
    }

    fn decode_fields(reader: &mut FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            op: enum_field(reader, Self::TYPE_ID, "op")?,
            name: reader.plaintext("name")?,
        })
    }
}

/// Payload of a type id the codec has no layout for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    pub type_id: u16,
    pub bytes: Bytes,
}

/// Decoded payload: one of the core messages, or raw bytes of an unmapped type
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    EntityInfo(EntityInfo),
    EntityList(EntityList),
    LoggingControl(LoggingControl),
    Heartbeat(Heartbeat),
    Announce(Announce),
    Unknown(RawPayload),
}

macro_rules! impl_into_payload {
    ($($kind:ident),*) => {
        $(
            impl From<$kind> for Payload {
                fn from(msg: $kind) -> Self {
                    Payload::$kind(msg)
                }
            }
        )*
    };
}

impl_into_payload!(EntityInfo, EntityList, LoggingControl, Heartbeat, Announce);

impl From<RawPayload> for Payload {
    fn from(raw: RawPayload) -> Self {
        Payload::Unknown(raw)
    }
}

impl Payload {
    pub fn type_id(&self) -> u16 {
        match self {
            Payload::EntityInfo(_) => EntityInfo::TYPE_ID,
            Payload::EntityList(_) => EntityList::TYPE_ID,
            Payload::LoggingControl(_) => LoggingControl::TYPE_ID,
            Payload::Heartbeat(_) => Heartbeat::TYPE_ID,
            Payload::Announce(_) => Announce::TYPE_ID,
            Payload::Unknown(raw) => raw.type_id,
        }
    }

    /// Type name, or `None` for unmapped types
    pub fn name(&self) -> Option<&'static str> {
        type_name(self.type_id())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Payload::Unknown(_))
    }

    /// Encode the payload fields (unknown payloads are passed through)
    pub fn encode_fields(&self) -> Bytes {
        let mut out = FieldWriter::new();
        match self {
            Payload::EntityInfo(m) => m.encode_fields(&mut out),
            Payload::EntityList(m) => m.encode_fields(&mut out),
            Payload::LoggingControl(m) => m.encode_fields(&mut out),
            Payload::Heartbeat(m) => m.encode_fields(&mut out),
            Payload::Announce(m) => m.encode_fields(&mut out),
            Payload::Unknown(raw) => return raw.bytes.clone(),
        }
        out.finish()
    }

    /// Decode the payload bytes of a frame of type `type_id`
    pub fn decode(type_id: u16, data: &[u8]) -> ProtocolResult<Self> {
        fn decode_kind<K: PayloadKind>(data: &[u8]) -> ProtocolResult<Payload> {
            let mut reader = FieldReader::new(K::TYPE_ID, data);
            let msg = K::decode_fields(&mut reader)?;
            reader.finish()?;
            Ok(msg.into())
        }

        match type_id {
            EntityInfo::TYPE_ID => decode_kind::<EntityInfo>(data),
            EntityList::TYPE_ID => decode_kind::<EntityList>(data),
            LoggingControl::TYPE_ID => decode_kind::<LoggingControl>(data),
            Heartbeat::TYPE_ID => decode_kind::<Heartbeat>(data),
            Announce::TYPE_ID => decode_kind::<Announce>(data),
            _ => Ok(Payload::Unknown(RawPayload {
                type_id,
                bytes: Bytes::copy_from_slice(data),
            })),
        }
    }
}

/// Known type name for an id
pub fn type_name(type_id: u16) -> Option<&'static str> {
    match type_id {
        EntityInfo::TYPE_ID => Some(EntityInfo::NAME),
        EntityList::TYPE_ID => Some(EntityList::NAME),
        LoggingControl::TYPE_ID => Some(LoggingControl::NAME),
        Heartbeat::TYPE_ID => Some(Heartbeat::NAME),
        Announce::TYPE_ID => Some(Announce::NAME),
        _ => None,
    }
}

/// Known type id for a name
pub fn type_id(name: &str) -> Option<u16> {
    match name {
        EntityInfo::NAME => Some(EntityInfo::TYPE_ID),
        EntityList::NAME => Some(EntityList::TYPE_ID),
        LoggingControl::NAME => Some(LoggingControl::TYPE_ID),
        Heartbeat::NAME => Some(Heartbeat::TYPE_ID),
        Announce::NAME => Some(Announce::TYPE_ID),
        _ => None,
    }
}

/// A decoded message: routing header plus typed payload
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: Header,
    pub payload: Payload,
}

impl Message {
    /// New message with a default header carrying the payload's type id
    pub fn new(payload: impl Into<Payload>) -> Self {
        let payload = payload.into();
        Self {
            header: Header::new(payload.type_id()),
            payload,
        }
    }

    pub fn type_id(&self) -> u16 {
        self.payload.type_id()
    }

    pub fn src(&self) -> u16 {
        self.header.src
    }

    pub fn timestamp(&self) -> f64 {
        self.header.timestamp
    }

    pub fn set_timestamp_now(&mut self) {
        self.header.set_timestamp_now();
    }

    /// Borrow the payload as a specific message kind
    pub fn get<K: PayloadKind>(&self) -> Option<&K> {
        K::from_payload(&self.payload)
    }

    pub fn is<K: PayloadKind>(&self) -> bool {
        self.get::<K>().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_list_report_sorted() {
        let report = EntityList::report([("Navigation", 5), ("Daemon", 0), ("Service Announcer", 1)]);
        assert_eq!(report.op, EntityListOp::Report);
        assert_eq!(report.list, "Daemon=0;Service Announcer=1;Navigation=5");
    }

    #[test]
    fn test_entity_list_entries_skip_malformed() {
        let list = EntityList {
            op: EntityListOp::Report,
            list: "Daemon=0;broken;GPS=12;Bad=300".to_string(),
        };
        assert_eq!(
            list.entries(),
            vec![("Daemon".to_string(), 0), ("GPS".to_string(), 12)]
        );
    }

    #[test]
    fn test_unknown_type_passthrough() {
        let payload = Payload::decode(999, &[1, 2, 3]).unwrap();
        assert!(payload.is_unknown());
        assert_eq!(payload.type_id(), 999);
        assert_eq!(payload.name(), None);
        assert_eq!(&payload.encode_fields()[..], &[1, 2, 3]);
    }

    #[test]
    fn test_invalid_enum_value() {
        let err = Payload::decode(EntityList::TYPE_ID, &[7, 0, 0]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { type_id: 5, offset: 0, .. }));
    }

    #[test]
    fn test_type_name_lookup() {
        assert_eq!(type_name(151), Some("Announce"));
        assert_eq!(type_id("Heartbeat"), Some(150));
        assert_eq!(type_id("EstimatedState"), None);
    }

    #[test]
    fn test_message_accessors() {
        let msg = Message::new(Heartbeat);
        assert_eq!(msg.header.type_id, Heartbeat::TYPE_ID);
        assert!(msg.is::<Heartbeat>());
        assert!(msg.get::<Announce>().is_none());
    }
}
