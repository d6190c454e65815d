//! Station selection from the command line or the config file.

use clap::Args;
use serde::Deserialize;

use radiovis_protocol::{
    BroadcastSystem, DabFields, FmFields, StationIdentity, ValidationError,
};

/// Broadcast parameters identifying one station.
#[derive(Args, Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StationArgs {
    /// Broadcast system: fm, dab, drm, amss or hd
    #[arg(short, long)]
    pub system: Option<String>,

    /// Display name
    #[arg(short, long)]
    pub name: Option<String>,

    /// FM: RDS programme identification (4 hex digits)
    #[arg(long)]
    pub pi: Option<String>,

    /// FM: RDS extended country code (2 hex digits); DAB: ECC (3 hex digits)
    #[arg(long)]
    pub ecc: Option<String>,

    /// FM: ISO 3166 country code, instead of --ecc
    #[arg(long)]
    pub country: Option<String>,

    /// FM: frequency in 10 kHz units (98.8 MHz is 9880)
    #[arg(long)]
    pub freq: Option<u32>,

    /// DAB: ensemble identifier (4 hex digits)
    #[arg(long)]
    pub eid: Option<String>,

    /// DAB, DRM, AMSS: service identifier
    #[arg(long)]
    pub sid: Option<String>,

    /// DAB: service component identifier
    #[arg(long)]
    pub scids: Option<String>,

    /// DAB: X-PAD application type
    #[arg(long)]
    pub appty: Option<String>,

    /// DAB: user application type
    #[arg(long)]
    pub uatype: Option<String>,

    /// DAB: packet address
    #[arg(long)]
    pub pa: Option<u32>,

    /// HD Radio: transmitter identifier (5 hex digits)
    #[arg(long)]
    pub tx: Option<String>,

    /// HD Radio: country code (3 hex digits)
    #[arg(long)]
    pub cc: Option<String>,
}

impl StationArgs {
    /// Fill fields unset here from `fallback`.
    pub fn or(self, fallback: StationArgs) -> StationArgs {
        StationArgs {
            system: self.system.or(fallback.system),
            name: self.name.or(fallback.name),
            pi: self.pi.or(fallback.pi),
            ecc: self.ecc.or(fallback.ecc),
            country: self.country.or(fallback.country),
            freq: self.freq.or(fallback.freq),
            eid: self.eid.or(fallback.eid),
            sid: self.sid.or(fallback.sid),
            scids: self.scids.or(fallback.scids),
            appty: self.appty.or(fallback.appty),
            uatype: self.uatype.or(fallback.uatype),
            pa: self.pa.or(fallback.pa),
            tx: self.tx.or(fallback.tx),
            cc: self.cc.or(fallback.cc),
        }
    }

    /// Validate into a station identity.
    pub fn build(&self) -> Result<StationIdentity, String> {
        let system: BroadcastSystem = self
            .system
            .as_deref()
            .ok_or("No broadcast system given (--system)")?
            .parse()?;
        let name = self.name.clone().unwrap_or_else(|| system.to_string());

        let station = match system {
            BroadcastSystem::Fm => StationIdentity::fm(
                name,
                FmFields {
                    pi: required(&self.pi, "pi")?,
                    ecc: self.ecc.as_deref(),
                    country: self.country.as_deref(),
                    freq: self.freq.ok_or_else(|| missing("freq"))?,
                },
            ),
            BroadcastSystem::Dab => StationIdentity::dab(
                name,
                DabFields {
                    ecc: required(&self.ecc, "ecc")?,
                    eid: required(&self.eid, "eid")?,
                    sid: required(&self.sid, "sid")?,
                    scids: required(&self.scids, "scids")?,
                    appty: self.appty.as_deref(),
                    uatype: self.uatype.as_deref(),
                    pa: self.pa,
                },
            ),
            BroadcastSystem::Drm => StationIdentity::drm(name, required(&self.sid, "sid")?),
            BroadcastSystem::Amss => StationIdentity::amss(name, required(&self.sid, "sid")?),
            BroadcastSystem::Hd => StationIdentity::hd(
                name,
                required(&self.tx, "tx")?,
                required(&self.cc, "cc")?,
            ),
        };

        station.map_err(|e: ValidationError| e.to_string())
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, String> {
    value.as_deref().ok_or_else(|| missing(field))
}

fn missing(field: &str) -> String {
    format!("Missing --{}", field)
}
