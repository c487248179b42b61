// ai
//! 🎰 Ticket generator: fake lift tickets, one JSON object per line, then the blank sentinel.
//!
//! 🎬 *[a load test needs tickets. nobody is going to ski 50,000 times for it.]*
//!
//! 🧠 Knowledge graph:
//! - The resort list is a [`ResortCatalog`] value handed in by the caller. Nothing global.
//! - Randomness is an injected [`Rng`]. Seed it and the tickets repeat (timestamps aside).
//! - Each optional field is `null` about half the time, so downstream code sees plenty of both.
//! - `purchase_time` is ISO-8601 UTC by default, epoch seconds for the push-style consumers.
//! - The output ends with an empty line. Consumers stop there. That is the contract.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rand::Rng;
use rand::seq::IndexedRandom;

use crate::common::{Address, EmergencyContact, PurchaseTime, TicketRecord};

const DEFAULT_RESORTS: [&str; 37] = [
    "Vail",
    "Beaver Creek",
    "Breckenridge",
    "Keystone",
    "Crested Butte",
    "Park City",
    "Heavenly",
    "Northstar",
    "Kirkwood",
    "Whistler Blackcomb",
    "Perisher",
    "Falls Creek",
    "Hotham",
    "Stowe",
    "Mount Snow",
    "Okemo",
    "Hunter Mountain",
    "Mount Sunapee",
    "Attitash",
    "Wildcat",
    "Crotched",
    "Stevens Pass",
    "Liberty",
    "Roundtop",
    "Whitetail",
    "Jack Frost",
    "Big Boulder",
    "Alpine Valley",
    "Boston Mills",
    "Brandywine",
    "Mad River",
    "Hidden Valley",
    "Snow Creek",
    "Wilmot",
    "Afton Alps",
    "Mt. Brighton",
    "Paoli Peaks",
];

const FIRST_NAMES: [&str; 16] = [
    "Ava", "Ben", "Chloe", "Diego", "Emma", "Felix", "Grace", "Hiro", "Isla", "Jonah", "Kira",
    "Liam", "Maya", "Noah", "Olive", "Priya",
];

const LAST_NAMES: [&str; 16] = [
    "Anderson", "Brooks", "Chen", "Dubois", "Evans", "Fischer", "Garcia", "Hughes", "Ito",
    "Jensen", "Kowalski", "Lopez", "Moreau", "Nguyen", "Okafor", "Patel",
];

const STREETS: [&str; 10] = [
    "Powder", "Gondola", "Summit", "Aspen", "Chairlift", "Mogul", "Glacier", "Timberline",
    "Snowmass", "Ridge",
];

const STREET_SUFFIXES: [&str; 5] = ["Way", "Road", "Lane", "Drive", "Court"];

// -- 🏔️ (city, state, postal prefix) so the address at least agrees with itself
const PLACES: [(&str, &str, &str); 10] = [
    ("Denver", "CO", "802"),
    ("Boulder", "CO", "803"),
    ("Salt Lake City", "UT", "841"),
    ("Reno", "NV", "895"),
    ("Burlington", "VT", "054"),
    ("Concord", "NH", "033"),
    ("Seattle", "WA", "981"),
    ("Pittsburgh", "PA", "152"),
    ("Minneapolis", "MN", "554"),
    ("Madison", "WI", "537"),
];

/// 🏔️ The resorts tickets can be sold for. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResortCatalog {
    resorts: Vec<String>,
}

impl ResortCatalog {
    pub fn new(resorts: Vec<String>) -> Result<Self> {
        if resorts.is_empty() {
            bail!("💀 A resort catalog with no resorts sells no tickets");
        }
        Ok(Self { resorts })
    }

    pub fn resorts(&self) -> &[String] {
        &self.resorts
    }

    fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        // -- non-empty by construction
        self.resorts.choose(rng).cloned().unwrap_or_default()
    }
}

impl Default for ResortCatalog {
    fn default() -> Self {
        Self {
            resorts: DEFAULT_RESORTS.iter().map(|r| r.to_string()).collect(),
        }
    }
}

/// ⏱️ How `purchase_time` is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimestampStyle {
    /// `2023-01-15T09:30:00.123456`, naive UTC.
    #[default]
    Iso,
    /// Seconds since the epoch, with a fractional part.
    Epoch,
}

/// 🎰 Makes tickets from a catalog and a source of randomness.
#[derive(Debug)]
pub struct TicketGenerator<'a, R> {
    catalog: &'a ResortCatalog,
    rng: R,
    timestamps: TimestampStyle,
}

fn pick<R: Rng + ?Sized>(values: &[&str], rng: &mut R) -> String {
    values.choose(rng).copied().unwrap_or_default().to_string()
}

impl<'a, R: Rng> TicketGenerator<'a, R> {
    pub fn new(catalog: &'a ResortCatalog, rng: R, timestamps: TimestampStyle) -> Self {
        Self {
            catalog,
            rng,
            timestamps,
        }
    }

    fn none_or<T>(&mut self, make: impl FnOnce(&mut R) -> T) -> Option<T> {
        if self.rng.random_bool(0.5) {
            None
        } else {
            Some(make(&mut self.rng))
        }
    }

    pub fn next_ticket(&mut self) -> TicketRecord {
        let mut uuid_bytes = [0u8; 16];
        self.rng.fill(&mut uuid_bytes);
        let txid = uuid::Builder::from_random_bytes(uuid_bytes).into_uuid();

        // -- 96 random bits, hex, no padding
        let rfid = format!("{:#x}", self.rng.random::<u128>() >> 32);

        let now = Utc::now();
        let purchase_time = match self.timestamps {
            TimestampStyle::Iso => {
                PurchaseTime::Iso(now.naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string())
            }
            TimestampStyle::Epoch => PurchaseTime::Epoch(now.timestamp_micros() as f64 / 1_000_000.0),
        };

        let name = full_name(&mut self.rng);
        let address = self.none_or(|rng| {
            let (city, state, postal_prefix) = *PLACES.choose(rng).unwrap_or(&PLACES[0]);
            Address {
                street_address: format!(
                    "{} {} {}",
                    rng.random_range(1..=9999),
                    pick(&STREETS, rng),
                    pick(&STREET_SUFFIXES, rng)
                ),
                city: city.to_string(),
                state: state.to_string(),
                postalcode: format!("{postal_prefix}{:02}", rng.random_range(0..100)),
            }
        });
        let phone = self.none_or(phone_number);
        let email = self.none_or(|rng| {
            format!(
                "{}.{}{}@example.com",
                pick(&FIRST_NAMES, rng).to_lowercase(),
                pick(&LAST_NAMES, rng).to_lowercase(),
                rng.random_range(1..100)
            )
        });
        let emergency_contact = self.none_or(|rng| EmergencyContact {
            name: full_name(rng),
            phone: phone_number(rng),
        });

        TicketRecord {
            txid: txid.to_string(),
            rfid,
            resort: self.catalog.pick(&mut self.rng),
            purchase_time,
            expiration_time: "2023-06-01".to_string(),
            days: self.rng.random_range(1..=7),
            name,
            address,
            phone,
            email,
            emergency_contact,
        }
    }
}

fn full_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{} {}", pick(&FIRST_NAMES, rng), pick(&LAST_NAMES, rng))
}

fn phone_number<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "({:03}) {:03}-{:04}",
        rng.random_range(200..1000),
        rng.random_range(200..1000),
        rng.random_range(0..10000)
    )
}

/// 📤 Write `count` tickets as NDJSON, then the blank sentinel line, then flush.
pub fn write_tickets<W: Write, R: Rng>(
    mut out: W,
    count: u64,
    generator: &mut TicketGenerator<'_, R>,
) -> Result<()> {
    for _ in 0..count {
        let ticket = generator.next_ticket();
        serde_json::to_writer(&mut out, &ticket).context("💀 A generated ticket would not serialize")?;
        out.write_all(b"\n").context("💀 Could not write a ticket line")?;
    }
    out.write_all(b"\n").context("💀 Could not write the closing sentinel line")?;
    out.flush().context("💀 Could not flush generated tickets")?;
    Ok(())
}
