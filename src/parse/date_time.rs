// SPDX-License-Identifier: (MIT OR Apache-2.0)

use nom::{
    bytes::complete::take,
    number::complete::{i8 as nom_i8, u8 as nom_u8},
};
use time::{Date, Month, OffsetDateTime, Time, UtcOffset};

use crate::error::NomRes;

/// Parses the 7-byte "short" date/time used inside directory records (ECMA-119 § 9.1.5).
///
/// Layout: year since 1900, month (1-12), day, hour, minute, second, GMT offset in 15-minute
/// intervals (signed, -48..=52).
pub(crate) fn date_time(i: &[u8]) -> NomRes<&[u8], OffsetDateTime> {
    let (i, years_since_1900) = nom_u8(i)?;
    let (i, month) = nom_u8(i)?;
    let (i, day) = nom_u8(i)?;
    let (i, hour) = nom_u8(i)?;
    let (i, minute) = nom_u8(i)?;
    let (i, second) = nom_u8(i)?;
    let (i, gmt_offset) = nom_i8(i)?;

    Ok((i, build_date_time(years_since_1900, month, day, hour, minute, second, 0, gmt_offset)))
}

/// Parses the 17-byte "long" date/time used in volume descriptors (ECMA-119 § 8.4.26.1).
///
/// Layout: 16 ASCII digit bytes `YYYYMMDDHHMMSShh` followed by a single signed byte GMT offset.
/// All-zero digits with a `0` terminator byte denotes "not specified" and is decoded as the Unix
/// epoch, matching the convention used elsewhere in the crate for absent/zeroed fields.
pub(crate) fn date_time_ascii(i: &[u8]) -> NomRes<&[u8], OffsetDateTime> {
    let (i, digits) = take(16usize)(i)?;
    let (i, gmt_offset) = nom_i8(i)?;

    let digits = std::str::from_utf8(digits).unwrap_or("0000000000000000");

    let field = |range: std::ops::Range<usize>| -> u32 {
        digits.get(range).and_then(|s| s.parse().ok()).unwrap_or(0)
    };

    let year = field(0..4);
    let month = field(4..6);
    let day = field(6..8);
    let hour = field(8..10);
    let minute = field(10..12);
    let second = field(12..14);
    let hundredths = field(14..16);

    if year == 0 {
        return Ok((i, OffsetDateTime::UNIX_EPOCH));
    }

    let dt = build_date_time(
        (year.saturating_sub(1900)) as u8,
        month as u8,
        day as u8,
        hour as u8,
        minute as u8,
        second as u8,
        hundredths as u8,
        gmt_offset,
    );
    Ok((i, dt))
}

fn build_date_time(
    years_since_1900: u8,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    hundredths: u8,
    gmt_offset_15min: i8,
) -> OffsetDateTime {
    let year = 1900 + i32::from(years_since_1900);
    let month = Month::try_from(month.clamp(1, 12)).unwrap_or(Month::January);
    let date = Date::from_calendar_date(year, month, day.clamp(1, 28).max(1))
        .unwrap_or_else(|_| Date::from_calendar_date(year, month, 1).unwrap());
    let time = Time::from_hms_milli(
        hour.min(23),
        minute.min(59),
        second.min(59),
        u16::from(hundredths) * 10,
    )
    .unwrap_or(Time::MIDNIGHT);
    let offset_minutes = i32::from(gmt_offset_15min) * 15;
    let offset =
        UtcOffset::from_whole_seconds(offset_minutes * 60).unwrap_or(UtcOffset::UTC);

    date.with_time(time).assume_offset(offset)
}

/// Encodes a timestamp as the 7-byte "short" form (ECMA-119 § 9.1.5), used by directory records
/// and by Rock Ridge `TF` entries.
pub(crate) fn encode_date_time_short(dt: OffsetDateTime, buf: &mut [u8; 7]) {
    let year = dt.year();
    buf[0] = (year - 1900).clamp(0, 255) as u8;
    buf[1] = dt.month() as u8;
    buf[2] = dt.day();
    buf[3] = dt.hour();
    buf[4] = dt.minute();
    buf[5] = dt.second();
    buf[6] = (dt.offset().whole_minutes() / 15) as i8 as u8;
}

/// Encodes a timestamp as the 17-byte "long" ASCII form (ECMA-119 § 8.4.26.1), used by volume
/// descriptor date fields.
pub(crate) fn encode_date_time_long(dt: Option<OffsetDateTime>, buf: &mut [u8; 17]) {
    match dt {
        Some(dt) => {
            let s = format!(
                "{:04}{:02}{:02}{:02}{:02}{:02}{:02}",
                dt.year(),
                dt.month() as u8,
                dt.day(),
                dt.hour(),
                dt.minute(),
                dt.second(),
                dt.millisecond() / 10,
            );
            buf[..16].copy_from_slice(s.as_bytes());
            buf[16] = (dt.offset().whole_minutes() / 15) as i8 as u8;
        }
        None => {
            buf[..16].copy_from_slice(b"0000000000000000");
            buf[16] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_round_trip() {
        let dt = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let mut buf = [0u8; 7];
        encode_date_time_short(dt, &mut buf);
        let (_, parsed) = date_time(&buf).unwrap();
        assert_eq!(parsed.year(), dt.year());
        assert_eq!(parsed.month(), dt.month());
        assert_eq!(parsed.day(), dt.day());
        assert_eq!(parsed.hour(), dt.hour());
    }

    #[test]
    fn long_round_trip() {
        let dt = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let mut buf = [0u8; 17];
        encode_date_time_long(Some(dt), &mut buf);
        let mut input = buf.to_vec();
        input.extend_from_slice(&[0]);
        let (_, parsed) = date_time_ascii(&input).unwrap();
        assert_eq!(parsed.year(), dt.year());
        assert_eq!(parsed.month(), dt.month());
    }

    #[test]
    fn long_unspecified_is_epoch() {
        let mut buf = [0u8; 17];
        encode_date_time_long(None, &mut buf);
        assert_eq!(&buf[..16], b"0000000000000000");
    }
}
