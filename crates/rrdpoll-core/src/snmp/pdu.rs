//! SNMP PDU envelope encode/decode
//!
//! Community-based messages only (v1 and v2c):
//!
//! ```text
//! Message ::= SEQUENCE { version INTEGER, community OCTET STRING, data PDU }
//! PDU     ::= [type] IMPLICIT SEQUENCE {
//!     request-id INTEGER, error-status INTEGER, error-index INTEGER,
//!     variable-bindings SEQUENCE OF SEQUENCE { name OID, value ... } }
//! ```

use crate::error::{Error, Result};
use crate::oid::Oid;
use crate::snmp::{MAX_PACKET, PduType, SnmpValue, SnmpVersion, ber};

/// A single variable binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    /// The object name
    pub oid: Oid,
    /// The bound value (Null in requests)
    pub value: SnmpValue,
}

impl VarBind {
    /// A request binding: the OID with a Null value
    #[must_use]
    pub fn request(oid: Oid) -> Self {
        Self {
            oid,
            value: SnmpValue::Null,
        }
    }
}

/// A decoded or to-be-encoded SNMP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    /// Protocol version
    pub version: SnmpVersion,
    /// Community string (cleartext on the wire)
    pub community: String,
    /// PDU type
    pub pdu_type: PduType,
    /// Request id; the engine uses 24-bit ids
    pub request_id: u32,
    /// Error status field (responses)
    pub error_status: i64,
    /// Error index field (responses)
    pub error_index: i64,
    /// Variable bindings
    pub bindings: Vec<VarBind>,
}

impl Pdu {
    /// A fresh request PDU with no bindings
    #[must_use]
    pub fn request(
        version: SnmpVersion,
        community: impl Into<String>,
        pdu_type: PduType,
        request_id: u32,
    ) -> Self {
        Self {
            version,
            community: community.into(),
            pdu_type,
            request_id,
            error_status: 0,
            error_index: 0,
            bindings: Vec::new(),
        }
    }

    /// Encode to wire bytes
    ///
    /// Fails when the encoded message would exceed [`MAX_PACKET`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut varbinds = Vec::new();
        for binding in &self.bindings {
            let mut entry = Vec::new();
            ber::write_oid(&mut entry, &binding.oid)?;
            ber::write_value(&mut entry, &binding.value)?;
            ber::write_tlv(&mut varbinds, ber::TAG_SEQUENCE, &entry);
        }

        let mut body = Vec::new();
        ber::write_integer(&mut body, i64::from(self.request_id));
        ber::write_integer(&mut body, self.error_status);
        ber::write_integer(&mut body, self.error_index);
        ber::write_tlv(&mut body, ber::TAG_SEQUENCE, &varbinds);

        let mut message = Vec::new();
        ber::write_integer(&mut message, self.version.wire());
        ber::write_octet_string(&mut message, self.community.as_bytes());
        ber::write_tlv(&mut message, self.pdu_type.tag(), &body);

        let mut packet = Vec::new();
        ber::write_tlv(&mut packet, ber::TAG_SEQUENCE, &message);

        if packet.len() > MAX_PACKET {
            return Err(Error::protocol(format!(
                "encoded pdu is {} bytes, exceeds the {MAX_PACKET}-byte packet limit",
                packet.len()
            )));
        }
        Ok(packet)
    }

    /// Decode a received datagram
    pub fn decode(packet: &[u8]) -> Result<Self> {
        let mut outer = ber::BerReader::new(packet);
        let message = outer.expect(ber::TAG_SEQUENCE)?;

        let mut reader = ber::BerReader::new(message);
        let version = SnmpVersion::from_wire(reader.read_integer()?)
            .ok_or_else(|| Error::protocol("unsupported snmp version"))?;
        let community_bytes = reader.expect(ber::TAG_OCTET_STRING)?;
        let community = String::from_utf8_lossy(community_bytes).into_owned();

        let (pdu_tag, body) = reader.read_tlv()?;
        let pdu_type = PduType::from_tag(pdu_tag)
            .ok_or_else(|| Error::protocol(format!("unsupported pdu tag {pdu_tag:#04x}")))?;

        let mut body_reader = ber::BerReader::new(body);
        let request_id = body_reader.read_integer()?;
        let request_id = u32::try_from(request_id)
            .map_err(|_| Error::protocol("request id out of range"))?;
        let error_status = body_reader.read_integer()?;
        let error_index = body_reader.read_integer()?;

        let varbinds = body_reader.expect(ber::TAG_SEQUENCE)?;
        let mut bindings = Vec::new();
        let mut binds_reader = ber::BerReader::new(varbinds);
        while !binds_reader.is_empty() {
            let entry = binds_reader.expect(ber::TAG_SEQUENCE)?;
            let mut entry_reader = ber::BerReader::new(entry);
            let oid = ber::decode_oid(entry_reader.expect(ber::TAG_OID)?)?;
            let (value_tag, value_content) = entry_reader.read_tlv()?;
            let value = ber::decode_value(value_tag, value_content)?;
            bindings.push(VarBind { oid, value });
        }

        Ok(Self {
            version,
            community,
            pdu_type,
            request_id,
            error_status,
            error_index,
            bindings,
        })
    }

    /// Build the response PDU answering this request
    #[must_use]
    pub fn response_to(&self) -> Self {
        Self {
            version: self.version,
            community: self.community.clone(),
            pdu_type: PduType::Response,
            request_id: self.request_id,
            error_status: 0,
            error_index: 0,
            bindings: Vec::new(),
        }
    }
}
