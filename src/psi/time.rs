//! Broadcast time fields: Modified Julian Date plus BCD time of day,
//! per ETSI EN 300 468 annex C.

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// MJD day 0 is 1858-11-17.
fn mjd_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1858, 11, 17).expect("valid constant date")
}

fn bcd_pair(byte: u8) -> Option<u32> {
    let hi = (byte >> 4) as u32;
    let lo = (byte & 0x0F) as u32;
    if hi > 9 || lo > 9 {
        return None;
    }
    Some(hi * 10 + lo)
}

/// Decodes a 40-bit UTC field: 16-bit MJD followed by 6 BCD digits
/// (hh mm ss). The all-ones pattern means "undefined".
pub fn decode_utc(d: &[u8]) -> Option<NaiveDateTime> {
    if d.len() < 5 {
        return None;
    }
    if d[..5] == [0xFF; 5] {
        return None;
    }
    let mjd = u16::from_be_bytes([d[0], d[1]]) as i64;
    let hours = bcd_pair(d[2])?;
    let minutes = bcd_pair(d[3])?;
    let seconds = bcd_pair(d[4])?;
    if hours > 23 || minutes > 59 || seconds > 59 {
        return None;
    }

    let date = mjd_epoch().checked_add_signed(Duration::days(mjd))?;
    date.and_hms_opt(hours, minutes, seconds)
}

/// Decodes a 24-bit BCD duration (hh mm ss) to seconds.
pub fn decode_bcd_duration(d: &[u8]) -> Option<u32> {
    if d.len() < 3 {
        return None;
    }
    let hours = bcd_pair(d[0])?;
    let minutes = bcd_pair(d[1])?;
    let seconds = bcd_pair(d[2])?;
    Some(hours * 3600 + minutes * 60 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_utc_known_value() {
        // Worked example from EN 300 468 annex C:
        // 93/10/13 12:45:00 is MJD 0xC079.
        let dt = decode_utc(&[0xC0, 0x79, 0x12, 0x45, 0x00]).unwrap();
        assert_eq!(dt.to_string(), "1993-10-13 12:45:00");
    }

    #[test]
    fn test_undefined_time() {
        assert!(decode_utc(&[0xFF; 5]).is_none());
    }

    #[test]
    fn test_invalid_bcd_rejected() {
        assert!(decode_utc(&[0xC0, 0x79, 0x1A, 0x45, 0x00]).is_none());
        assert!(decode_utc(&[0xC0, 0x79, 0x25, 0x00, 0x00]).is_none());
    }

    #[test]
    fn test_duration() {
        assert_eq!(decode_bcd_duration(&[0x01, 0x30, 0x15]), Some(5415));
        assert_eq!(decode_bcd_duration(&[0x00, 0x00, 0x00]), Some(0));
        assert_eq!(decode_bcd_duration(&[0x0A, 0x00, 0x00]), None);
    }
}
