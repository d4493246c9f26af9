//! Fake record generation
//!
//! A lazy, seeded source of person-shaped records, used to exercise the
//! write pipeline with realistic row sizes. The generator is an infinite
//! iterator; callers bound it with `take`. One record is materialized at a
//! time, so memory stays flat regardless of how many records are drawn.

use crate::types::{JsonValue, Record};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

const FIRST_NAMES: &[&str] = &[
    "Alice", "Bob", "Carol", "David", "Elena", "Frank", "Grace", "Henry", "Irene", "James",
    "Karen", "Luis", "Maria", "Noah", "Olivia", "Pedro", "Quinn", "Rosa", "Samuel", "Tina",
];

const LAST_NAMES: &[&str] = &[
    "Anderson", "Brown", "Chen", "Davis", "Evans", "Fischer", "Garcia", "Hansen", "Ivanov",
    "Johnson", "Kim", "Lopez", "Martinez", "Nguyen", "Olsen", "Patel", "Quintero", "Rossi",
    "Schmidt", "Tanaka",
];

const STREET_NAMES: &[&str] = &[
    "Oak", "Maple", "Cedar", "Pine", "Elm", "Birch", "Willow", "Chestnut", "Spruce", "Walnut",
];

const STREET_SUFFIXES: &[&str] = &["St", "Ave", "Blvd", "Ln", "Dr", "Ct"];

const CITIES: &[&str] = &[
    "Springfield", "Riverside", "Fairview", "Greenville", "Bristol", "Clinton", "Salem",
    "Madison", "Georgetown", "Arlington", "Ashland", "Burlington", "Dover", "Hudson", "Milton",
];

const STATES: &[&str] = &[
    "Alabama", "California", "Colorado", "Florida", "Georgia", "Illinois", "Michigan",
    "New York", "Ohio", "Oregon", "Texas", "Vermont", "Virginia", "Washington", "Wisconsin",
];

const COUNTRIES: &[&str] = &[
    "United States", "Canada", "Mexico", "Brazil", "Germany", "France", "Spain", "Italy",
    "Japan", "Australia", "Netherlands", "Sweden", "Norway", "Ireland", "Portugal",
];

const JOBS: &[&str] = &[
    "Accountant", "Architect", "Chemist", "Data Analyst", "Electrician", "Geologist",
    "Journalist", "Librarian", "Nurse", "Pharmacist", "Pilot", "Surveyor", "Teacher",
    "Translator", "Veterinarian",
];

const COMPANY_SUFFIXES: &[&str] = &["Inc", "LLC", "Group", "Ltd", "and Sons", "Partners"];

const EMAIL_DOMAINS: &[&str] = &[
    "example.com", "example.org", "example.net", "mail.test", "post.test",
];

const LOREM: &[&str] = &[
    "system", "record", "stream", "value", "process", "signal", "result", "storage", "account",
    "service", "report", "message", "network", "project", "feature", "request", "number",
    "object", "series", "window",
];

/// Seeded fake record generator.
///
/// Yields an unbounded stream of records with a fixed column set, assigning
/// sequential ids. Identical seeds produce identical streams.
pub struct RecordGenerator {
    rng: StdRng,
    next_id: u64,
}

impl RecordGenerator {
    /// Create a generator with the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            next_id: 0,
        }
    }

    fn pick<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }

    fn sentence(&mut self, words: usize) -> String {
        let mut out = String::new();
        for i in 0..words {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(self.pick(LOREM));
        }
        out
    }

    fn next_record(&mut self) -> Record {
        let id = self.next_id;
        self.next_id += 1;

        let first = self.pick(FIRST_NAMES);
        let last = self.pick(LAST_NAMES);
        let city = self.pick(CITIES);
        let company_base = self.pick(LAST_NAMES);

        let value = json!({
            "id": id,
            "name": format!("{first} {last}"),
            "email": format!(
                "{}.{}@{}",
                first.to_lowercase(),
                last.to_lowercase(),
                self.pick(EMAIL_DOMAINS)
            ),
            "address": format!(
                "{} {} {}",
                self.rng.gen_range(1..10_000),
                self.pick(STREET_NAMES),
                self.pick(STREET_SUFFIXES)
            ),
            "city": city,
            "state": self.pick(STATES),
            "zip_code": format!("{:05}", self.rng.gen_range(501..99_951)),
            "country": self.pick(COUNTRIES),
            "phone_number": format!(
                "({:03}) {:03}-{:04}",
                self.rng.gen_range(200..1_000),
                self.rng.gen_range(200..1_000),
                self.rng.gen_range(0..10_000)
            ),
            "job": self.pick(JOBS),
            "company": format!("{company_base} {}", self.pick(COMPANY_SUFFIXES)),
            "ipv4": format!(
                "{}.{}.{}.{}",
                self.rng.gen_range(1..255),
                self.rng.gen_range(0..256),
                self.rng.gen_range(0..256),
                self.rng.gen_range(1..255)
            ),
            "text": self.sentence(24),
        });

        match value {
            JsonValue::Object(map) => map,
            _ => unreachable!("json! object literal"),
        }
    }
}

impl Iterator for RecordGenerator {
    type Item = crate::error::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(Ok(self.next_record()))
    }
}
