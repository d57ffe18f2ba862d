//! Beacon fields carried in manufacturer data.
//!
//! Manufacturer data travels base64 encoded, laid out as the little-endian
//! company id followed by the vendor payload. For iBeacon frames that puts
//! the low byte of `major` at offset 21 and the low byte of `minor` at 23.

use base64::{
    Engine,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use serde::Serialize;

pub const MAJOR_OFFSET: usize = 21;
pub const MINOR_OFFSET: usize = 23;

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Serialize, PartialEq, Eq, Debug, Clone, Copy, Default)]
pub struct BeaconFields {
    pub major: Option<u8>,
    pub minor: Option<u8>,
}

impl BeaconFields {
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> BeaconFields {
        BeaconFields {
            major: bytes.get(MAJOR_OFFSET).copied(),
            minor: bytes.get(MINOR_OFFSET).copied(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.major.is_none() && self.minor.is_none()
    }
}

/// Never fails: missing, short or undecodable payloads give absent fields.
/// A zero byte is reported as `Some(0)`.
#[must_use]
pub fn decode_beacon_fields(manufacturer_data: Option<&str>) -> BeaconFields {
    let Some(encoded) = manufacturer_data else {
        return BeaconFields::default();
    };
    match LENIENT.decode(encoded.trim()) {
        Ok(bytes) => BeaconFields::from_bytes(&bytes),
        Err(_) => BeaconFields::default(),
    }
}

#[must_use]
pub fn encode_manufacturer_data(company_id: u16, payload: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(payload.len() + 2);
    bytes.extend_from_slice(&company_id.to_le_bytes());
    bytes.extend_from_slice(payload);
    LENIENT.encode(bytes)
}

#[cfg(test)]
mod test {
    use base64::{Engine, prelude::BASE64_STANDARD};

    use super::{BeaconFields, decode_beacon_fields, encode_manufacturer_data};

    fn ibeacon(major: u16, minor: u16) -> Vec<u8> {
        let mut payload = vec![0x02, 0x15];
        payload.extend_from_slice(&[0xAB; 16]);
        payload.extend_from_slice(&major.to_be_bytes());
        payload.extend_from_slice(&minor.to_be_bytes());
        payload.push(0xC5);
        payload
    }

    #[test]
    fn absent_input() {
        assert_eq!(decode_beacon_fields(None), BeaconFields::default());
    }

    #[test]
    fn fixed_offsets() {
        let mut bytes = vec![0u8; 24];
        bytes[21] = 0x07;
        bytes[23] = 0x2A;
        let encoded = BASE64_STANDARD.encode(&bytes);
        assert_eq!(
            decode_beacon_fields(Some(&encoded)),
            BeaconFields {
                major: Some(7),
                minor: Some(42)
            }
        );
    }

    #[test]
    fn too_short() {
        let encoded = BASE64_STANDARD.encode([1u8; 10]);
        assert!(decode_beacon_fields(Some(&encoded)).is_empty());
    }

    #[test]
    fn only_major_fits() {
        let encoded = BASE64_STANDARD.encode([9u8; 22]);
        assert_eq!(
            decode_beacon_fields(Some(&encoded)),
            BeaconFields {
                major: Some(9),
                minor: None
            }
        );
    }

    #[test]
    fn malformed_base64() {
        assert!(decode_beacon_fields(Some("not base64 at all!")).is_empty());
    }

    #[test]
    fn zero_is_not_absent() {
        let encoded = BASE64_STANDARD.encode([0u8; 24]);
        assert_eq!(
            decode_beacon_fields(Some(&encoded)),
            BeaconFields {
                major: Some(0),
                minor: Some(0)
            }
        );
    }

    #[test]
    fn unpadded_input() {
        let encoded = BASE64_STANDARD.encode([5u8; 25]);
        let unpadded = encoded.trim_end_matches('=');
        assert_eq!(decode_beacon_fields(Some(unpadded)).major, Some(5));
    }

    #[test]
    fn ibeacon_frame_from_company_id_and_payload() {
        let encoded = encode_manufacturer_data(0x004C, &ibeacon(0x0107, 0x022A));
        assert_eq!(
            decode_beacon_fields(Some(&encoded)),
            BeaconFields {
                major: Some(0x07),
                minor: Some(0x2A)
            }
        );
    }
}
