//! Broadcast station identity and RadioDNS name derivation.
//!
//! Every broadcast system contributes an ordered list of identifier fields,
//! most specific first. The RadioDNS hostname is that list followed by the
//! system tag and the domain suffix; the RadioVIS topic is the same list plus
//! the system tag in reverse order under `/topic`:
//!
//! ```text
//! 0.c221.ce15.ce1.dab.radiodns.org  ->  /topic/dab/ce1/ce15/c221/0/text
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Default RadioDNS domain suffix.
pub const DEFAULT_DOMAIN: &str = "radiodns.org";

/// Root path segment of every RadioVIS topic.
const TOPIC_ROOT: &str = "/topic/";

/// Highest FM frequency value, in 10 kHz units.
const MAX_FM_FREQ: u32 = 99_999;

/// Highest DAB packet address.
const MAX_DAB_PA: u32 = 1023;

/// Broadcast transmission system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastSystem {
    /// VHF/FM with RDS.
    Fm,
    /// DAB Digital Radio.
    Dab,
    /// Digital Radio Mondiale.
    Drm,
    /// AM Signalling System.
    Amss,
    /// HD Radio.
    Hd,
}

impl BroadcastSystem {
    /// RadioDNS label for this system.
    pub fn tag(self) -> &'static str {
        match self {
            BroadcastSystem::Fm => "fm",
            BroadcastSystem::Dab => "dab",
            BroadcastSystem::Drm => "drm",
            BroadcastSystem::Amss => "amss",
            BroadcastSystem::Hd => "hd",
        }
    }
}

impl fmt::Display for BroadcastSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for BroadcastSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fm" => Ok(BroadcastSystem::Fm),
            "dab" => Ok(BroadcastSystem::Dab),
            "drm" => Ok(BroadcastSystem::Drm),
            "amss" => Ok(BroadcastSystem::Amss),
            "hd" => Ok(BroadcastSystem::Hd),
            other => Err(format!("Unknown broadcast protocol: {}", other)),
        }
    }
}

/// RadioVIS topic leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicKind {
    /// Text caption messages.
    Text,
    /// Slideshow image messages.
    Image,
}

impl TopicKind {
    fn leaf(self) -> &'static str {
        match self {
            TopicKind::Text => "text",
            TopicKind::Image => "image",
        }
    }
}

/// Unvalidated FM parameters.
///
/// Exactly one of `ecc` and `country` must be given.
#[derive(Debug, Clone, Copy, Default)]
pub struct FmFields<'a> {
    /// RDS programme identification code, 4 hex digits.
    pub pi: &'a str,
    /// RDS extended country code, 2 hex digits.
    pub ecc: Option<&'a str>,
    /// ISO 3166 two-letter country code, when no ECC is broadcast.
    pub country: Option<&'a str>,
    /// Frequency in 10 kHz units (98.8 MHz is 9880).
    pub freq: u32,
}

/// Unvalidated DAB parameters.
///
/// `appty` and `uatype` go together, and exclude `pa`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DabFields<'a> {
    /// Extended country code, 3 hex digits.
    pub ecc: &'a str,
    /// Ensemble identifier, 4 hex digits.
    pub eid: &'a str,
    /// Service identifier, 4 or 8 hex digits.
    pub sid: &'a str,
    /// Service component identifier within the service, 1 or 3 hex digits.
    pub scids: &'a str,
    /// X-PAD application type, 2 hex digits.
    pub appty: Option<&'a str>,
    /// User application type, 3 hex digits.
    pub uatype: Option<&'a str>,
    /// Packet address of an independent data service component.
    pub pa: Option<u32>,
}

/// Validated per-system identifier fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastParams {
    /// FM: frequency, PI code, country (ISO code or PI nibble + ECC).
    Fm {
        /// Zero-padded 5 digit frequency.
        freq: String,
        /// Programme identification code.
        pi: String,
        /// Country label.
        country: String,
    },
    /// DAB service component.
    Dab {
        /// `appty-uatype` or the packet address, if any.
        data: Option<String>,
        /// Service component identifier.
        scids: String,
        /// Service identifier.
        sid: String,
        /// Ensemble identifier.
        eid: String,
        /// Extended country code.
        ecc: String,
    },
    /// DRM service.
    Drm {
        /// Service identifier.
        sid: String,
    },
    /// AMSS service.
    Amss {
        /// Service identifier.
        sid: String,
    },
    /// HD Radio transmitter.
    Hd {
        /// Transmitter identifier.
        tx: String,
        /// Country code.
        cc: String,
    },
}

impl BroadcastParams {
    /// Broadcast system of these parameters.
    pub fn system(&self) -> BroadcastSystem {
        match self {
            BroadcastParams::Fm { .. } => BroadcastSystem::Fm,
            BroadcastParams::Dab { .. } => BroadcastSystem::Dab,
            BroadcastParams::Drm { .. } => BroadcastSystem::Drm,
            BroadcastParams::Amss { .. } => BroadcastSystem::Amss,
            BroadcastParams::Hd { .. } => BroadcastSystem::Hd,
        }
    }

    /// Identifier fields in hostname order, most specific first.
    fn query_fields(&self) -> Vec<&str> {
        match self {
            BroadcastParams::Fm { freq, pi, country } => {
                vec![freq.as_str(), pi.as_str(), country.as_str()]
            }
            BroadcastParams::Dab {
                data,
                scids,
                sid,
                eid,
                ecc,
            } => {
                let mut fields = Vec::with_capacity(5);
                if let Some(data) = data {
                    fields.push(data.as_str());
                }
                fields.extend([scids.as_str(), sid.as_str(), eid.as_str(), ecc.as_str()]);
                fields
            }
            BroadcastParams::Drm { sid } | BroadcastParams::Amss { sid } => vec![sid.as_str()],
            BroadcastParams::Hd { tx, cc } => vec![tx.as_str(), cc.as_str()],
        }
    }
}

/// A radio station's validated broadcast identity.
///
/// Immutable apart from the domain suffix, which can be switched between
/// RadioDNS roots (e.g. a staging domain).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationIdentity {
    name: String,
    domain: String,
    params: BroadcastParams,
}

impl StationIdentity {
    /// Create an FM station.
    pub fn fm(name: impl Into<String>, fields: FmFields<'_>) -> Result<Self, ValidationError> {
        let pi = hex_field("pi", fields.pi, &[4])?;

        let country = match (fields.country, fields.ecc) {
            (Some(_), Some(_)) => {
                return Err(ValidationError::MutuallyExclusive("country", "ecc"));
            }
            (Some(country), None) => {
                if country.len() == 2 && country.bytes().all(|b| b.is_ascii_alphabetic()) {
                    country.to_string()
                } else {
                    return Err(ValidationError::InvalidField("country"));
                }
            }
            (None, Some(ecc)) => {
                let ecc = hex_field("ecc", ecc, &[2])?;
                // pi is ASCII hex at this point.
                format!("{}{}", &pi[..1], ecc)
            }
            (None, None) => return Err(ValidationError::MissingField("country or ecc")),
        };

        if fields.freq > MAX_FM_FREQ {
            return Err(ValidationError::InvalidField("freq"));
        }

        Ok(Self::with_params(
            name,
            BroadcastParams::Fm {
                freq: format!("{:05}", fields.freq),
                pi,
                country,
            },
        ))
    }

    /// Create a DAB station.
    pub fn dab(name: impl Into<String>, fields: DabFields<'_>) -> Result<Self, ValidationError> {
        let ecc = hex_field("ecc", fields.ecc, &[3])?;
        let eid = hex_field("eid", fields.eid, &[4])?;
        let sid = hex_field("sid", fields.sid, &[4, 8])?;
        let scids = hex_field("scids", fields.scids, &[1, 3])?;

        let data = match (fields.appty, fields.uatype, fields.pa) {
            (Some(appty), Some(uatype), None) => {
                let appty = hex_field("appty", appty, &[2])?;
                let uatype = hex_field("uatype", uatype, &[3])?;
                Some(format!("{}-{}", appty, uatype))
            }
            (Some(_), None, _) | (None, Some(_), _) => {
                return Err(ValidationError::IncompletePair("appty", "uatype"));
            }
            (Some(_), Some(_), Some(_)) => {
                return Err(ValidationError::MutuallyExclusive("pa", "appty-uatype"));
            }
            (None, None, Some(pa)) => {
                if pa > MAX_DAB_PA {
                    return Err(ValidationError::InvalidField("pa"));
                }
                Some(pa.to_string())
            }
            (None, None, None) => None,
        };

        Ok(Self::with_params(
            name,
            BroadcastParams::Dab {
                data,
                scids,
                sid,
                eid,
                ecc,
            },
        ))
    }

    /// Create a DRM station.
    pub fn drm(name: impl Into<String>, sid: &str) -> Result<Self, ValidationError> {
        let sid = hex_field("sid", sid, &[6])?;
        Ok(Self::with_params(name, BroadcastParams::Drm { sid }))
    }

    /// Create an AMSS station.
    pub fn amss(name: impl Into<String>, sid: &str) -> Result<Self, ValidationError> {
        let sid = hex_field("sid", sid, &[6])?;
        Ok(Self::with_params(name, BroadcastParams::Amss { sid }))
    }

    /// Create an HD Radio station.
    pub fn hd(name: impl Into<String>, tx: &str, cc: &str) -> Result<Self, ValidationError> {
        let tx = hex_field("tx", tx, &[5])?;
        let cc = hex_field("cc", cc, &[3])?;
        Ok(Self::with_params(name, BroadcastParams::Hd { tx, cc }))
    }

    fn with_params(name: impl Into<String>, params: BroadcastParams) -> Self {
        Self {
            name: name.into(),
            domain: DEFAULT_DOMAIN.to_string(),
            params,
        }
    }

    /// Station display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current RadioDNS domain suffix.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Replace the RadioDNS domain suffix.
    pub fn set_domain(&mut self, domain: impl Into<String>) {
        self.domain = domain.into();
    }

    /// Broadcast system tag.
    pub fn system(&self) -> BroadcastSystem {
        self.params.system()
    }

    /// Validated identifier fields.
    pub fn params(&self) -> &BroadcastParams {
        &self.params
    }

    /// Fully-qualified RadioDNS hostname.
    pub fn hostname(&self) -> String {
        let mut labels = self.params.query_fields();
        labels.push(self.system().tag());
        labels.push(&self.domain);
        labels.join(".")
    }

    /// RadioVIS topic for the given message kind.
    pub fn topic(&self, kind: TopicKind) -> String {
        let mut segments = self.params.query_fields();
        segments.push(self.system().tag());
        segments.reverse();
        format!("{}{}/{}", TOPIC_ROOT, segments.join("/"), kind.leaf())
    }

    /// Topic for TEXT messages.
    pub fn text_topic(&self) -> String {
        self.topic(TopicKind::Text)
    }

    /// Topic for SHOW messages.
    pub fn image_topic(&self) -> String {
        self.topic(TopicKind::Image)
    }
}

impl fmt::Display for StationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.hostname())
    }
}

/// Check a fixed-width hexadecimal field. Case is preserved.
fn hex_field(
    name: &'static str,
    value: &str,
    widths: &[usize],
) -> Result<String, ValidationError> {
    if widths.contains(&value.len()) && value.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(value.to_string())
    } else {
        Err(ValidationError::InvalidField(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbc_radio_1() -> StationIdentity {
        StationIdentity::dab(
            "BBC Radio 1",
            DabFields {
                ecc: "ce1",
                eid: "ce15",
                sid: "c221",
                scids: "0",
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_fm_with_ecc() {
        let station = StationIdentity::fm(
            "Test FM Station",
            FmFields {
                pi: "abcd",
                ecc: Some("bc"),
                country: None,
                freq: 12345,
            },
        )
        .unwrap();
        assert_eq!(station.hostname(), "12345.abcd.abc.fm.radiodns.org");
        assert_eq!(station.text_topic(), "/topic/fm/abc/abcd/12345/text");
    }

    #[test]
    fn test_fm_with_country_and_padding() {
        let station = StationIdentity::fm(
            "Radio 4",
            FmFields {
                pi: "C204",
                ecc: None,
                country: Some("gb"),
                freq: 9380,
            },
        )
        .unwrap();
        assert_eq!(station.hostname(), "09380.C204.gb.fm.radiodns.org");
    }

    #[test]
    fn test_fm_country_and_ecc_rules() {
        let both = StationIdentity::fm(
            "x",
            FmFields {
                pi: "abcd",
                ecc: Some("bc"),
                country: Some("gb"),
                freq: 1,
            },
        );
        assert_eq!(
            both,
            Err(ValidationError::MutuallyExclusive("country", "ecc"))
        );

        let neither = StationIdentity::fm(
            "x",
            FmFields {
                pi: "abcd",
                freq: 1,
                ..Default::default()
            },
        );
        assert!(matches!(neither, Err(ValidationError::MissingField(_))));

        let bad_pi = StationIdentity::fm(
            "x",
            FmFields {
                pi: "abcg",
                ecc: Some("bc"),
                country: None,
                freq: 1,
            },
        );
        assert_eq!(bad_pi, Err(ValidationError::InvalidField("pi")));

        let bad_freq = StationIdentity::fm(
            "x",
            FmFields {
                pi: "abcd",
                ecc: Some("bc"),
                country: None,
                freq: 100_000,
            },
        );
        assert_eq!(bad_freq, Err(ValidationError::InvalidField("freq")));
    }

    #[test]
    fn test_dab() {
        let station = bbc_radio_1();
        assert_eq!(station.hostname(), "0.c221.ce15.ce1.dab.radiodns.org");
        assert_eq!(station.text_topic(), "/topic/dab/ce1/ce15/c221/0/text");
        assert_eq!(station.image_topic(), "/topic/dab/ce1/ce15/c221/0/image");
        assert_eq!(station.name(), "BBC Radio 1");
        assert_eq!(station.system(), BroadcastSystem::Dab);
    }

    #[test]
    fn test_dab_packet_address() {
        let station = StationIdentity::dab(
            "BBC Radio 1",
            DabFields {
                ecc: "abc",
                eid: "abcd",
                sid: "abcd",
                scids: "0",
                pa: Some(1023),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(station.hostname(), "1023.0.abcd.abcd.abc.dab.radiodns.org");
        assert_eq!(station.text_topic(), "/topic/dab/abc/abcd/abcd/0/1023/text");
    }

    #[test]
    fn test_dab_appty_uatype() {
        let station = StationIdentity::dab(
            "BBC Radio 1",
            DabFields {
                ecc: "abc",
                eid: "abcd",
                sid: "abcd",
                scids: "0",
                appty: Some("01"),
                uatype: Some("234"),
                pa: None,
            },
        )
        .unwrap();
        assert_eq!(
            station.hostname(),
            "01-234.0.abcd.abcd.abc.dab.radiodns.org"
        );
        assert_eq!(
            station.image_topic(),
            "/topic/dab/abc/abcd/abcd/0/01-234/image"
        );
    }

    #[test]
    fn test_dab_field_groups() {
        let base = DabFields {
            ecc: "abc",
            eid: "abcd",
            sid: "abcd",
            scids: "0",
            ..Default::default()
        };

        let missing_uatype = StationIdentity::dab(
            "x",
            DabFields {
                appty: Some("01"),
                ..base
            },
        );
        assert_eq!(
            missing_uatype,
            Err(ValidationError::IncompletePair("appty", "uatype"))
        );

        let missing_appty = StationIdentity::dab(
            "x",
            DabFields {
                uatype: Some("234"),
                ..base
            },
        );
        assert_eq!(
            missing_appty,
            Err(ValidationError::IncompletePair("appty", "uatype"))
        );

        let both = StationIdentity::dab(
            "x",
            DabFields {
                appty: Some("01"),
                uatype: Some("234"),
                pa: Some(1023),
                ..base
            },
        );
        assert_eq!(
            both,
            Err(ValidationError::MutuallyExclusive("pa", "appty-uatype"))
        );

        let bad_pa = StationIdentity::dab(
            "x",
            DabFields {
                pa: Some(1024),
                ..base
            },
        );
        assert_eq!(bad_pa, Err(ValidationError::InvalidField("pa")));

        let bad_sid = StationIdentity::dab(
            "x",
            DabFields {
                sid: "abcde",
                ..base
            },
        );
        assert_eq!(bad_sid, Err(ValidationError::InvalidField("sid")));
    }

    #[test]
    fn test_drm_amss_hd() {
        let drm = StationIdentity::drm("DRM Station", "abcdef").unwrap();
        assert_eq!(drm.hostname(), "abcdef.drm.radiodns.org");
        assert_eq!(drm.text_topic(), "/topic/drm/abcdef/text");
        assert_eq!(drm.image_topic(), "/topic/drm/abcdef/image");

        let amss = StationIdentity::amss("AMSS Station", "abcdef").unwrap();
        assert_eq!(amss.hostname(), "abcdef.amss.radiodns.org");
        assert_eq!(amss.image_topic(), "/topic/amss/abcdef/image");

        let hd = StationIdentity::hd("HD Station", "aaaaa", "ccc").unwrap();
        assert_eq!(hd.hostname(), "aaaaa.ccc.hd.radiodns.org");
        assert_eq!(hd.text_topic(), "/topic/hd/ccc/aaaaa/text");

        assert!(StationIdentity::drm("x", "abcde").is_err());
        assert!(StationIdentity::hd("x", "aaaaa", "cccc").is_err());
    }

    #[test]
    fn test_set_domain_changes_hostname_only() {
        let mut station = bbc_radio_1();
        let topic = station.text_topic();
        station.set_domain("example.com");
        assert_eq!(station.hostname(), "0.c221.ce15.ce1.dab.example.com");
        assert_eq!(station.text_topic(), topic);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = bbc_radio_1();
        let b = bbc_radio_1();
        assert_eq!(a.hostname(), a.hostname());
        assert_eq!(a.hostname(), b.hostname());
        assert_eq!(a.topic(TopicKind::Text), b.topic(TopicKind::Text));
    }

    #[test]
    fn test_broadcast_system_from_str() {
        assert_eq!("DAB".parse::<BroadcastSystem>(), Ok(BroadcastSystem::Dab));
        assert!("unknown".parse::<BroadcastSystem>().is_err());
    }
}
