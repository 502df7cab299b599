//! EXIF / filename / path datetime and GPS extraction, in that priority
//! order: returns as soon as the first source yields a result, partial or
//! complete, and never falls through after a hit.
//!
//! The EXIF reader reads tags via `rexif` into a flat string map, the same
//! way a metadata reader module would. EXIF datetime priority is
//! `DateTimeOriginal > DateTimeDigitized > DateTimeModified` — the canonical
//! order, chosen over a variant that prefers plain `DateTime` ahead of
//! `DateTimeDigitized`.

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;
use std::sync::OnceLock;

/// A datetime where any suffix of `{year, month, day, hour, minute, second}`
/// may be absent, reflecting that filename/path sources rarely supply full
/// precision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialDateTime {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub second: Option<u32>,
}

impl PartialDateTime {
    fn year_only(year: i32) -> Self {
        Self {
            year: Some(year),
            ..Default::default()
        }
    }

    /// An ISO-8601-flavored string using whatever precision is available;
    /// `None` if even the year is missing.
    pub fn to_iso_string(&self) -> Option<String> {
        let year = self.year?;
        let mut s = format!("{year:04}");
        if let Some(m) = self.month {
            s.push_str(&format!("-{m:02}"));
            if let Some(d) = self.day {
                s.push_str(&format!("-{d:02}"));
                if let Some(h) = self.hour {
                    s.push_str(&format!("T{h:02}"));
                    if let Some(mi) = self.minute {
                        s.push_str(&format!(":{mi:02}"));
                        if let Some(se) = self.second {
                            s.push_str(&format!(":{se:02}"));
                        }
                    }
                }
            }
        }
        Some(s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CameraInfo {
    pub make: Option<String>,
    pub model: Option<String>,
    pub exposure_time: Option<String>,
    pub f_number: Option<String>,
    pub iso: Option<String>,
    pub focal_length: Option<String>,
}

fn exif_datetime_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\d{4})[:\-/](\d{2})[:\-/](\d{2})[ T](\d{2}):(\d{2}):(\d{2})(?:\.\d+)?$",
        )
        .unwrap()
    })
}

/// Parses one of the accepted EXIF datetime formats (§4.3): the canonical
/// `YYYY:MM:DD HH:MM:SS` plus `-`/`/`-separated variants and an optional
/// fractional-second suffix.
fn parse_exif_datetime(raw: &str) -> Option<PartialDateTime> {
    let caps = exif_datetime_regex().captures(raw.trim())?;
    Some(PartialDateTime {
        year: caps[1].parse().ok(),
        month: caps[2].parse().ok(),
        day: caps[3].parse().ok(),
        hour: caps[4].parse().ok(),
        minute: caps[5].parse().ok(),
        second: caps[6].parse().ok(),
    })
}

/// First non-empty EXIF source wins, in canonical priority order.
pub fn datetime_from_exif(exif: &HashMap<String, String>) -> Option<PartialDateTime> {
    for key in ["DateTimeOriginal", "DateTimeDigitized", "DateTimeModified", "DateTime"] {
        if let Some(raw) = exif.get(key) {
            if let Some(dt) = parse_exif_datetime(raw) {
                return Some(dt);
            }
        }
    }
    None
}

struct FilenamePattern {
    regex: Regex,
}

fn filename_patterns() -> &'static Vec<FilenamePattern> {
    static PATTERNS: OnceLock<Vec<FilenamePattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            // 1. YYYY[-_]MM[-_]DD[_ ]HH[-:]MM[-:]SS
            FilenamePattern {
                regex: Regex::new(
                    r"(\d{4})[-_](\d{2})[-_](\d{2})[_ ](\d{2})[-:](\d{2})[-:](\d{2})",
                )
                .unwrap(),
            },
            // 2. YYYYMMDD[_ -]HHMMSS
            FilenamePattern {
                regex: Regex::new(r"(\d{4})(\d{2})(\d{2})[_ -](\d{2})(\d{2})(\d{2})").unwrap(),
            },
            // 3. IMG[_-]YYYYMMDD[_-]HHMMSS
            FilenamePattern {
                regex: Regex::new(
                    r"IMG[_-](\d{4})(\d{2})(\d{2})[_-](\d{2})(\d{2})(\d{2})",
                )
                .unwrap(),
            },
            // 4. YYYY-MM-DD
            FilenamePattern {
                regex: Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap(),
            },
            // 5. YYYYMMDD
            FilenamePattern {
                regex: Regex::new(r"(?:^|[^0-9])((?:19|20)\d{2})(\d{2})(\d{2})(?:[^0-9]|$)").unwrap(),
            },
        ]
    })
}

/// Rejects calendar-nonsense values a regex shape alone can't exclude, e.g.
/// month 99 or minute 61. Fields left `None` are always accepted.
fn is_calendar_valid(
    month: Option<u32>,
    day: Option<u32>,
    hour: Option<u32>,
    minute: Option<u32>,
    second: Option<u32>,
) -> bool {
    month.is_none_or(|m| (1..=12).contains(&m))
        && day.is_none_or(|d| (1..=31).contains(&d))
        && hour.is_none_or(|h| h <= 23)
        && minute.is_none_or(|m| m <= 59)
        && second.is_none_or(|s| s <= 59)
}

/// Tries each filename pattern in order (first match wins) against the
/// file stem (extension stripped). A match whose digits don't form a valid
/// calendar date or time yields to the next pattern instead of being
/// accepted verbatim.
pub fn datetime_from_filename(stem: &str) -> Option<PartialDateTime> {
    for (idx, pattern) in filename_patterns().iter().enumerate() {
        if let Some(caps) = pattern.regex.captures(stem) {
            let get = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
            let year = caps.get(1).and_then(|m| m.as_str().parse::<i32>().ok());
            let month = get(2);
            let day = get(3);
            // Patterns 1-3 carry time components; 4-5 do not.
            let has_time = idx < 3;
            let hour = if has_time { get(4) } else { None };
            let minute = if has_time { get(5) } else { None };
            let second = if has_time { get(6) } else { None };

            if !is_calendar_valid(month, day, hour, minute, second) {
                continue;
            }

            return Some(PartialDateTime {
                year,
                month,
                day,
                hour,
                minute,
                second,
            });
        }
    }
    None
}

fn path_year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(19|20)\d{2}$").unwrap())
}

/// Scans path components from deepest to shallowest for a standalone
/// four-digit year; yields a year-only result.
pub fn datetime_from_path(path: &Path) -> Option<PartialDateTime> {
    let components: Vec<&str> = path
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    for component in components.iter().rev() {
        if path_year_regex().is_match(component) {
            let year: i32 = component.parse().ok()?;
            return Some(PartialDateTime::year_only(year));
        }
    }
    None
}

/// `parse_datetime(path, exif)` with strict priority EXIF > filename > path;
/// returns at the first source that yields a result, never falling through
/// after a hit (Testable Property 5).
pub fn parse_datetime(path: &Path, exif: Option<&HashMap<String, String>>) -> Option<PartialDateTime> {
    if let Some(exif) = exif {
        if let Some(dt) = datetime_from_exif(exif) {
            return Some(dt);
        }
    }
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    if let Some(dt) = datetime_from_filename(stem) {
        return Some(dt);
    }
    datetime_from_path(path)
}

/// Converts an EXIF GPS (degrees, minutes, seconds, ref) tuple to a signed
/// decimal coordinate. Rejects any malformed component.
pub fn convert_gps_coordinate(degrees: f64, minutes: f64, seconds: f64, reference: &str) -> Option<f64> {
    if !degrees.is_finite() || !minutes.is_finite() || !seconds.is_finite() {
        return None;
    }
    let magnitude = degrees + minutes / 60.0 + seconds / 3600.0;
    match reference.trim().to_uppercase().as_str() {
        "N" | "E" => Some(magnitude),
        "S" | "W" => Some(-magnitude),
        _ => None,
    }
}

/// Reads the informal camera-info fields out of an already-parsed EXIF map
/// (§4.3 ambient supplement). Returns `None` fields for anything absent.
pub fn camera_info_from_exif(exif: &HashMap<String, String>) -> CameraInfo {
    CameraInfo {
        make: exif.get("Make").cloned(),
        model: exif.get("Model").cloned(),
        exposure_time: exif.get("ExposureTime").cloned(),
        f_number: exif.get("FNumber").cloned(),
        iso: exif.get("ISOSpeedRatings").cloned(),
        focal_length: exif.get("FocalLength").cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exif_wins_over_filename_and_path() {
        let mut exif = HashMap::new();
        exif.insert("DateTimeOriginal".to_string(), "2020:06:15 10:00:00".to_string());
        let path = Path::new("2018/2019-07-04_pic.jpg");
        let dt = parse_datetime(path, Some(&exif)).unwrap();
        assert_eq!(dt.year, Some(2020));
    }

    #[test]
    fn filename_wins_without_exif() {
        let path = Path::new("2018/2019-07-04_pic.jpg");
        let dt = parse_datetime(path, None).unwrap();
        assert_eq!(dt.year, Some(2019));
        assert_eq!(dt.month, Some(7));
        assert_eq!(dt.day, Some(4));
    }

    #[test]
    fn path_year_is_last_resort() {
        let path = Path::new("2018/vacation/beach.jpg");
        let dt = parse_datetime(path, None).unwrap();
        assert_eq!(dt.year, Some(2018));
        assert_eq!(dt.month, None);
        assert_eq!(dt.day, None);
    }

    #[test]
    fn gps_conversion_negates_south_and_west() {
        let lat = convert_gps_coordinate(37.0, 48.0, 36.0, "S").unwrap();
        assert!((lat - (-37.81)).abs() < 0.001);
        let lon = convert_gps_coordinate(122.0, 25.0, 6.0, "W").unwrap();
        assert!((lon - (-122.4183)).abs() < 0.001);
    }

    #[test]
    fn gps_conversion_rejects_bad_reference() {
        assert!(convert_gps_coordinate(1.0, 0.0, 0.0, "Q").is_none());
    }

    #[test]
    fn invalid_calendar_digits_fall_through_instead_of_storing() {
        assert!(datetime_from_filename("9999-99-99").is_none());
        let path = Path::new("9999-99-99.jpg");
        assert!(parse_datetime(path, None).is_none());
    }

    #[test]
    fn calendar_valid_filename_still_matches() {
        let dt = datetime_from_filename("2019-07-04").unwrap();
        assert_eq!(dt.year, Some(2019));
        assert_eq!(dt.month, Some(7));
        assert_eq!(dt.day, Some(4));
    }
}
