// ai
//! 🎟️ Common data structures: the lift ticket and the batch that carries it.
//!
//! 🎬 COLD OPEN - EXT. SKI RESORT - 8:59 AM
//!
//! The lift line is forty people deep. Every one of them bought a ticket.
//! Every ticket has a txid, an rfid, a resort, and a `days` count that is
//! somehow always 7 for the guy who skis twice. Somewhere downstream, a
//! warehouse wants all of them, in order, in columns. 🦆
//!
//! This module defines the humble structs that ferry those tickets from stdin
//! to the columnar file. They carry the data. They do not ask where it's going.

use serde::{Deserialize, Deserializer, Serialize};

/// 📐 The fixed column order. The materializer's schema follows it, the insert
/// statement follows it, and the Python that came before us followed it too.
pub const TICKET_COLUMNS: [&str; 11] = [
    "txid",
    "rfid",
    "resort",
    "purchase_time",
    "expiration_time",
    "days",
    "name",
    "address",
    "phone",
    "email",
    "emergency_contact",
];

/// 🎟️ One lift ticket. The atomic unit of this whole operation.
///
/// Every one of the 11 keys must be present in the input. The optional ones may
/// be `null`, but they may not be *missing*: a missing key is a decode error,
/// same as a typo in the JSON. That's what the `nullable` deserializer enforces.
///
/// Unknown extra keys are ignored. We are strict about what we need and
/// relaxed about what we don't. Like a bouncer who only checks IDs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub txid: String,
    pub rfid: String,
    pub resort: String,
    pub purchase_time: PurchaseTime,
    pub expiration_time: String,
    pub days: u32,
    pub name: String,
    #[serde(deserialize_with = "nullable")]
    pub address: Option<Address>,
    #[serde(deserialize_with = "nullable")]
    pub phone: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub email: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub emergency_contact: Option<EmergencyContact>,
}

/// ⏱️ When the ticket was bought. ISO-8601 text for the staged variants,
/// epoch seconds for the push-style producers. We take either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PurchaseTime {
    Iso(String),
    Epoch(f64),
}

/// 🏠 Where the skier lives, if they told us.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub postalcode: String,
}

/// 🚑 Who to call when the skier meets a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
}

// -- 🔒 Option<T> without #[serde(default)] still treats a missing key as None.
// -- Routing through deserialize_with turns that off: key required, null allowed.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// 📦 An ordered run of 1..=N tickets, handed from the accumulator to the
/// materializer exactly once. Nobody mutates it after the handoff.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 🔢 1-based sequence number within this run, for logs and errors.
    pub number: u64,
    pub records: Vec<TicketRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
