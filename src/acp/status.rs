//! Decoding of the ACP system status page
//!
//! `/ac/asystemstatus.asp` answers with JavaScript calls of the form
//! `_s('sm_obsStat','@wnOnline')`. Values are percent-encoded and carry a
//! type prefix that selects a small decoding rule.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::acp::error::{AcpError, AcpResult};
use crate::models::StatusSnapshot;

/// Owner value reported when nothing holds the observatory
pub const OWNER_FREE: &str = "Free";

/// Error reported when the observatory state is `Offline`
pub const OFFLINE_MESSAGE: &str = "The observatory is offline";

/// Prefix decoders, checked in order; `@inn` must precede `@in`
const DECODERS: &[(&str, fn(&str) -> String)] = &[
    ("@inn", decode_unavailable),
    ("@an", decode_plain),
    ("@wn", decode_plain),
    ("@in", decode_numeric),
];

static STATUS_CALL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_s\('([^']+)'\s*,\s*'([^']*)'\)").unwrap());

static WARNING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"----\s*\r?\n\[([^\]]+)\]([^\r\n]+)\r?\n----").unwrap());

fn decode_plain(value: &str) -> String {
    value.to_string()
}

fn decode_numeric(value: &str) -> String {
    value.replace("---", "--")
}

fn decode_unavailable(value: &str) -> String {
    if value == "n/a" {
        "N/A".to_string()
    } else {
        value.to_string()
    }
}

/// Percent-decode and apply the prefix rule to one raw value
///
/// A literal `+` is kept (declinations carry one), unlike form decoding.
pub fn decode_value(raw: &str) -> String {
    let escaped = raw.replace('+', "%2B");
    let decoded: String = url::form_urlencoded::parse(format!("v={escaped}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| raw.to_string());

    DECODERS
        .iter()
        .find(|(prefix, _)| decoded.starts_with(prefix))
        .map(|(prefix, decode)| decode(&decoded[prefix.len()..]))
        .unwrap_or(decoded)
}

/// Parse every `_s('key','value')` call into a key/value map
pub fn parse_status_text(text: &str) -> HashMap<String, String> {
    STATUS_CALL_REGEX
        .captures_iter(text)
        .map(|caps| (caps[1].to_string(), decode_value(&caps[2])))
        .collect()
}

/// Extract `----\n[type]message\n----` warning blocks as `[type]message`
pub fn extract_warnings(text: &str) -> Vec<String> {
    if !text.to_lowercase().contains("warning") {
        return Vec::new();
    }
    WARNING_REGEX
        .captures_iter(text)
        .map(|caps| format!("[{}]{}", &caps[1], caps[2].trim()))
        .collect()
}

/// Decoded observatory status
#[derive(Debug, Clone, PartialEq)]
pub struct ObservatoryStatus {
    pub observatory_status: String,
    pub owner: String,
    pub telescope_status: String,
    pub camera_status: String,
    pub guider_status: String,
    pub current_ra: String,
    pub current_dec: String,
    pub current_alt: String,
    pub current_az: String,
    pub image_filter: String,
    pub image_temperature: String,
    pub plan_progress: String,
    pub last_fwhm: String,
    pub local_time: String,
    pub utc_time: String,
    pub lst: String,
    pub warnings: Vec<String>,
}

impl Default for ObservatoryStatus {
    fn default() -> Self {
        Self {
            observatory_status: "Offline".to_string(),
            owner: OWNER_FREE.to_string(),
            telescope_status: "Offline".to_string(),
            camera_status: "Offline".to_string(),
            guider_status: "Offline".to_string(),
            current_ra: String::new(),
            current_dec: String::new(),
            current_alt: String::new(),
            current_az: String::new(),
            image_filter: String::new(),
            image_temperature: String::new(),
            plan_progress: "0/0".to_string(),
            last_fwhm: String::new(),
            local_time: String::new(),
            utc_time: String::new(),
            lst: String::new(),
            warnings: Vec::new(),
        }
    }
}

impl ObservatoryStatus {
    /// Decode a status response that must carry at least one status field
    ///
    /// A body without any `_s(...)` call is usually a login or error page
    /// served with status 200.
    pub fn parse_response(text: &str) -> AcpResult<Self> {
        if !STATUS_CALL_REGEX.is_match(text) {
            return Err(AcpError::Protocol(format!(
                "status page has no status fields ({} bytes)",
                text.len()
            )));
        }
        Ok(Self::from_response(text))
    }

    /// Decode a full status response body
    pub fn from_response(text: &str) -> Self {
        let mut map = parse_status_text(text);
        let defaults = Self::default();
        let mut take = |key: &str, fallback: String| map.remove(key).unwrap_or(fallback);

        Self {
            observatory_status: take("sm_obsStat", defaults.observatory_status),
            owner: take("sm_obsOwner", defaults.owner),
            telescope_status: take("sm_scopeStat", defaults.telescope_status),
            camera_status: take("sm_camStat", defaults.camera_status),
            guider_status: take("sm_guideStat", defaults.guider_status),
            current_ra: take("sm_ra", defaults.current_ra),
            current_dec: take("sm_dec", defaults.current_dec),
            current_alt: take("sm_alt", defaults.current_alt),
            current_az: take("sm_az", defaults.current_az),
            image_filter: take("sm_imgFilt", defaults.image_filter),
            image_temperature: take("sm_imgTemp", defaults.image_temperature),
            plan_progress: take("sm_plnSet", defaults.plan_progress),
            last_fwhm: take("sm_lastFWHM", defaults.last_fwhm),
            local_time: take("sm_local", defaults.local_time),
            utc_time: take("sm_utc", defaults.utc_time),
            lst: take("sm_lst", defaults.lst),
            warnings: extract_warnings(text),
        }
    }

    /// Something (a script or plan) currently owns the observatory
    pub fn is_running(&self) -> bool {
        let owner = self.owner.trim();
        !owner.is_empty() && owner != OWNER_FREE
    }

    pub fn is_offline(&self) -> bool {
        self.observatory_status.trim().eq_ignore_ascii_case("offline")
    }

    /// First warning, or the offline message
    pub fn error(&self) -> Option<String> {
        self.warnings
            .first()
            .cloned()
            .or_else(|| self.is_offline().then(|| OFFLINE_MESSAGE.to_string()))
    }

    pub fn to_snapshot(&self) -> StatusSnapshot {
        let non_empty = |s: &str| {
            let s = s.trim();
            (!s.is_empty() && s != "N/A" && s != "--").then(|| s.to_string())
        };
        StatusSnapshot {
            is_running: self.is_running(),
            current_filter: non_empty(&self.image_filter),
            error: self.error(),
            plan_progress: non_empty(&self.plan_progress),
        }
    }
}
