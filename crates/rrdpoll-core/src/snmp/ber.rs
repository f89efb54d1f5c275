//! ASN.1 BER primitives for the SNMP codec
//!
//! Definite-length encoding only, packets capped at [`super::MAX_PACKET`]
//! bytes. Writers append TLVs to a byte vector; the reader walks a received
//! datagram slice without copying.

use crate::error::{Error, Result};
use crate::oid::{MAX_OID_LEN, Oid};
use crate::snmp::SnmpValue;

/// Universal INTEGER tag
pub const TAG_INTEGER: u8 = 0x02;
/// Universal OCTET STRING tag
pub const TAG_OCTET_STRING: u8 = 0x04;
/// Universal NULL tag
pub const TAG_NULL: u8 = 0x05;
/// Universal OBJECT IDENTIFIER tag
pub const TAG_OID: u8 = 0x06;
/// Universal SEQUENCE tag (constructed)
pub const TAG_SEQUENCE: u8 = 0x30;
/// Application IpAddress tag
pub const TAG_IPADDRESS: u8 = 0x40;
/// Application Counter32 tag
pub const TAG_COUNTER32: u8 = 0x41;
/// Application Gauge32 tag
pub const TAG_GAUGE32: u8 = 0x42;
/// Application TimeTicks tag
pub const TAG_TIMETICKS: u8 = 0x43;
/// Application Opaque tag
pub const TAG_OPAQUE: u8 = 0x44;
/// Application Counter64 tag
pub const TAG_COUNTER64: u8 = 0x46;
/// Context noSuchObject exception tag
pub const TAG_NO_SUCH_OBJECT: u8 = 0x80;
/// Context noSuchInstance exception tag
pub const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
/// Context endOfMibView exception tag
pub const TAG_END_OF_MIB_VIEW: u8 = 0x82;

/// Append a definite-length TLV
pub fn write_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    write_length(out, content.len());
    out.extend_from_slice(content);
}

fn write_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xFF {
        out.push(0x81);
        out.push(len as u8);
    } else {
        // Bounded by MAX_PACKET, two length octets always suffice
        out.push(0x82);
        out.push((len >> 8) as u8);
        out.push((len & 0xFF) as u8);
    }
}

/// Minimal two's-complement big-endian bytes of a signed integer
fn int_content(value: i64) -> Vec<u8> {
    let raw = value.to_be_bytes();
    let mut start = 0;
    while start < raw.len() - 1 {
        let drop = (raw[start] == 0x00 && raw[start + 1] & 0x80 == 0)
            || (raw[start] == 0xFF && raw[start + 1] & 0x80 != 0);
        if !drop {
            break;
        }
        start += 1;
    }
    raw[start..].to_vec()
}

/// Minimal unsigned big-endian bytes, with a leading zero octet when the
/// high bit would read as a sign
fn uint_content(value: u64) -> Vec<u8> {
    let mut bytes: Vec<u8> = value
        .to_be_bytes()
        .iter()
        .copied()
        .skip_while(|&b| b == 0)
        .collect();
    if bytes.is_empty() {
        bytes.push(0);
    }
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0);
    }
    bytes
}

/// Append a signed INTEGER
pub fn write_integer(out: &mut Vec<u8>, value: i64) {
    write_tlv(out, TAG_INTEGER, &int_content(value));
}

/// Append an unsigned integer under the given application tag
pub fn write_unsigned(out: &mut Vec<u8>, tag: u8, value: u64) {
    write_tlv(out, tag, &uint_content(value));
}

/// Append an OCTET STRING
pub fn write_octet_string(out: &mut Vec<u8>, bytes: &[u8]) {
    write_tlv(out, TAG_OCTET_STRING, bytes);
}

fn write_base128(out: &mut Vec<u8>, value: u32) {
    let mut shift = 28;
    let mut started = false;
    while shift > 0 {
        let septet = ((value >> shift) & 0x7F) as u8;
        if septet != 0 || started {
            out.push(septet | 0x80);
            started = true;
        }
        shift -= 7;
    }
    out.push((value & 0x7F) as u8);
}

/// Append an OBJECT IDENTIFIER
pub fn write_oid(out: &mut Vec<u8>, oid: &Oid) -> Result<()> {
    let subs = oid.subs();
    let mut content = Vec::new();
    match subs {
        [] => content.push(0),
        [first] => {
            if *first > 2 {
                return Err(Error::protocol(format!("invalid oid first arc: {oid}")));
            }
            content.push((first * 40) as u8);
        }
        [first, second, rest @ ..] => {
            if *first > 2 || (*first < 2 && *second >= 40) {
                return Err(Error::protocol(format!("invalid oid leading arcs: {oid}")));
            }
            write_base128(&mut content, first * 40 + second);
            for sub in rest {
                write_base128(&mut content, *sub);
            }
        }
    }
    write_tlv(out, TAG_OID, &content);
    Ok(())
}

/// Append a typed SNMP value
pub fn write_value(out: &mut Vec<u8>, value: &SnmpValue) -> Result<()> {
    match value {
        SnmpValue::Null => write_tlv(out, TAG_NULL, &[]),
        SnmpValue::Integer(v) => write_integer(out, *v),
        SnmpValue::OctetString(bytes) => write_octet_string(out, bytes),
        SnmpValue::Oid(oid) => write_oid(out, oid)?,
        SnmpValue::IpAddress(octets) => write_tlv(out, TAG_IPADDRESS, octets),
        SnmpValue::Counter32(v) => write_unsigned(out, TAG_COUNTER32, u64::from(*v)),
        SnmpValue::Gauge32(v) => write_unsigned(out, TAG_GAUGE32, u64::from(*v)),
        SnmpValue::TimeTicks(v) => write_unsigned(out, TAG_TIMETICKS, u64::from(*v)),
        SnmpValue::Opaque(bytes) => write_tlv(out, TAG_OPAQUE, bytes),
        SnmpValue::Counter64(v) => write_unsigned(out, TAG_COUNTER64, *v),
        SnmpValue::NoSuchObject => write_tlv(out, TAG_NO_SUCH_OBJECT, &[]),
        SnmpValue::NoSuchInstance => write_tlv(out, TAG_NO_SUCH_INSTANCE, &[]),
        SnmpValue::EndOfMibView => write_tlv(out, TAG_END_OF_MIB_VIEW, &[]),
    }
    Ok(())
}

/// Sequential reader over a received datagram
pub struct BerReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BerReader<'a> {
    /// Create a reader over a packet slice
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Whether all bytes have been consumed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn read_byte(&mut self) -> Result<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| Error::protocol("truncated packet"))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_length(&mut self) -> Result<usize> {
        let first = self.read_byte()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }
        let octets = (first & 0x7F) as usize;
        if octets == 0 || octets > 2 {
            return Err(Error::protocol("unsupported BER length form"));
        }
        let mut len = 0usize;
        for _ in 0..octets {
            len = (len << 8) | self.read_byte()? as usize;
        }
        Ok(len)
    }

    /// Read the next TLV, returning its tag and content slice
    pub fn read_tlv(&mut self) -> Result<(u8, &'a [u8])> {
        let tag = self.read_byte()?;
        let len = self.read_length()?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| Error::protocol("BER length exceeds packet"))?;
        let content = &self.buf[self.pos..end];
        self.pos = end;
        Ok((tag, content))
    }

    /// Read a TLV and require the given tag
    pub fn expect(&mut self, tag: u8) -> Result<&'a [u8]> {
        let (got, content) = self.read_tlv()?;
        if got != tag {
            return Err(Error::protocol(format!(
                "unexpected BER tag {got:#04x}, wanted {tag:#04x}"
            )));
        }
        Ok(content)
    }

    /// Read a signed INTEGER
    pub fn read_integer(&mut self) -> Result<i64> {
        let content = self.expect(TAG_INTEGER)?;
        decode_i64(content)
    }
}

/// Decode a signed integer content field
pub fn decode_i64(content: &[u8]) -> Result<i64> {
    if content.is_empty() || content.len() > 8 {
        return Err(Error::protocol("bad integer length"));
    }
    let mut acc: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in content {
        acc = (acc << 8) | i64::from(b);
    }
    Ok(acc)
}

/// Decode an unsigned integer content field (tolerates one leading zero)
pub fn decode_u64(content: &[u8]) -> Result<u64> {
    let trimmed = match content {
        [0, rest @ ..] if !rest.is_empty() => rest,
        other => other,
    };
    if trimmed.is_empty() || trimmed.len() > 8 {
        return Err(Error::protocol("bad unsigned integer length"));
    }
    let mut acc: u64 = 0;
    for &b in trimmed {
        acc = (acc << 8) | u64::from(b);
    }
    Ok(acc)
}

/// Decode an OBJECT IDENTIFIER content field
pub fn decode_oid(content: &[u8]) -> Result<Oid> {
    let mut subs = Vec::new();
    let mut iter = content.iter().copied().peekable();

    let mut first = true;
    while iter.peek().is_some() {
        let mut value: u32 = 0;
        loop {
            let b = iter
                .next()
                .ok_or_else(|| Error::protocol("truncated oid sub-identifier"))?;
            if value > (u32::MAX >> 7) {
                return Err(Error::protocol("oid sub-identifier overflow"));
            }
            value = (value << 7) | u32::from(b & 0x7F);
            if b & 0x80 == 0 {
                break;
            }
        }
        if first {
            first = false;
            if value < 40 {
                subs.push(0);
                subs.push(value);
            } else if value < 80 {
                subs.push(1);
                subs.push(value - 40);
            } else {
                subs.push(2);
                subs.push(value - 80);
            }
        } else {
            subs.push(value);
        }
        if subs.len() > MAX_OID_LEN {
            return Err(Error::protocol("oid too long"));
        }
    }

    if subs.is_empty() {
        return Err(Error::protocol("empty oid"));
    }
    Oid::new(subs).map_err(|_| Error::protocol("oid too long"))
}

/// Decode a typed SNMP value from its TLV
pub fn decode_value(tag: u8, content: &[u8]) -> Result<SnmpValue> {
    let value = match tag {
        TAG_NULL => SnmpValue::Null,
        TAG_INTEGER => SnmpValue::Integer(decode_i64(content)?),
        TAG_OCTET_STRING => SnmpValue::OctetString(content.to_vec()),
        TAG_OID => SnmpValue::Oid(decode_oid(content)?),
        TAG_IPADDRESS => {
            let octets: [u8; 4] = content
                .try_into()
                .map_err(|_| Error::protocol("ip address must be 4 octets"))?;
            SnmpValue::IpAddress(octets)
        }
        TAG_COUNTER32 => SnmpValue::Counter32(truncate_u32(decode_u64(content)?)?),
        TAG_GAUGE32 => SnmpValue::Gauge32(truncate_u32(decode_u64(content)?)?),
        TAG_TIMETICKS => SnmpValue::TimeTicks(truncate_u32(decode_u64(content)?)?),
        TAG_OPAQUE => SnmpValue::Opaque(content.to_vec()),
        TAG_COUNTER64 => SnmpValue::Counter64(decode_u64(content)?),
        TAG_NO_SUCH_OBJECT => SnmpValue::NoSuchObject,
        TAG_NO_SUCH_INSTANCE => SnmpValue::NoSuchInstance,
        TAG_END_OF_MIB_VIEW => SnmpValue::EndOfMibView,
        other => {
            return Err(Error::protocol(format!(
                "unsupported value tag {other:#04x}"
            )));
        }
    };
    Ok(value)
}

fn truncate_u32(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::protocol("32-bit value out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip_value(value: &SnmpValue) -> SnmpValue {
        let mut buf = Vec::new();
        write_value(&mut buf, value).unwrap();
        let mut reader = BerReader::new(&buf);
        let (tag, content) = reader.read_tlv().unwrap();
        decode_value(tag, content).unwrap()
    }

    #[test]
    fn test_integer_encoding_minimal() {
        let mut buf = Vec::new();
        write_integer(&mut buf, 127);
        assert_eq!(buf, vec![TAG_INTEGER, 1, 0x7F]);

        buf.clear();
        write_integer(&mut buf, 128);
        assert_eq!(buf, vec![TAG_INTEGER, 2, 0x00, 0x80]);

        buf.clear();
        write_integer(&mut buf, -1);
        assert_eq!(buf, vec![TAG_INTEGER, 1, 0xFF]);

        buf.clear();
        write_integer(&mut buf, -129);
        assert_eq!(buf, vec![TAG_INTEGER, 2, 0xFF, 0x7F]);
    }

    #[test]
    fn test_unsigned_sign_padding() {
        let mut buf = Vec::new();
        write_unsigned(&mut buf, TAG_COUNTER32, 0xFFFF_FFFF);
        assert_eq!(buf, vec![TAG_COUNTER32, 5, 0x00, 0xFF, 0xFF, 0xFF, 0xFF]);
        let mut reader = BerReader::new(&buf);
        let (tag, content) = reader.read_tlv().unwrap();
        assert_eq!(tag, TAG_COUNTER32);
        assert_eq!(decode_u64(content).unwrap(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_long_length_form() {
        let bytes = vec![0xABu8; 300];
        let mut buf = Vec::new();
        write_octet_string(&mut buf, &bytes);
        assert_eq!(&buf[..4], &[TAG_OCTET_STRING, 0x82, 0x01, 0x2C]);
        let mut reader = BerReader::new(&buf);
        let content = reader.expect(TAG_OCTET_STRING).unwrap();
        assert_eq!(content, &bytes[..]);
    }

    #[test]
    fn test_oid_round_trip() {
        let oid = Oid::parse("1.3.6.1.4.1.2680.1.2.7.3.2.0").unwrap();
        let mut buf = Vec::new();
        write_oid(&mut buf, &oid).unwrap();
        let mut reader = BerReader::new(&buf);
        let content = reader.expect(TAG_OID).unwrap();
        assert_eq!(decode_oid(content).unwrap(), oid);
    }

    #[test]
    fn test_oid_large_arc() {
        // Sub-identifiers above 127 need multi-byte base-128 arcs
        let oid = Oid::parse("1.3.6.1.2.1.2.2.1.10.100000").unwrap();
        let mut buf = Vec::new();
        write_oid(&mut buf, &oid).unwrap();
        let mut reader = BerReader::new(&buf);
        let content = reader.expect(TAG_OID).unwrap();
        assert_eq!(decode_oid(content).unwrap(), oid);
    }

    #[test]
    fn test_value_round_trips() {
        let values = [
            SnmpValue::Null,
            SnmpValue::Integer(-42),
            SnmpValue::OctetString(b"eth0".to_vec()),
            SnmpValue::Oid(Oid::parse("1.3.6.1.2.1.1.3.0").unwrap()),
            SnmpValue::IpAddress([198, 51, 100, 7]),
            SnmpValue::Counter32(4_000_000_000),
            SnmpValue::Gauge32(100),
            SnmpValue::TimeTicks(123_456),
            SnmpValue::Opaque(vec![0x9F, 0x78, 0x04]),
            SnmpValue::Counter64(18_000_000_000_000_000_000),
            SnmpValue::NoSuchObject,
            SnmpValue::NoSuchInstance,
            SnmpValue::EndOfMibView,
        ];
        for value in &values {
            assert_eq!(&round_trip_value(value), value, "{value:?}");
        }
    }

    #[test]
    fn test_truncated_packet_rejected() {
        let mut buf = Vec::new();
        write_octet_string(&mut buf, b"public");
        buf.truncate(buf.len() - 2);
        let mut reader = BerReader::new(&buf);
        assert!(reader.read_tlv().is_err());
    }

    #[test]
    fn test_indefinite_length_rejected() {
        let buf = [TAG_OCTET_STRING, 0x80, 0x00, 0x00];
        let mut reader = BerReader::new(&buf);
        assert!(reader.read_tlv().is_err());
    }
}
