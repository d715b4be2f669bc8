//! Request bodies sent by each iteration.

use crate::error::LoadError;
use bytes::Bytes;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CATEGORIES: &[&str] = &["Electronics", "Clothing", "Books", "Toys", "Furniture"];

const WORDS: &[&str] = &[
    "alpha", "bright", "compact", "durable", "eager", "field", "gadget", "harbor", "input",
    "jolly", "kettle", "lumen", "modular", "nimble", "orbit", "pocket", "quartz", "rapid",
    "sturdy", "travel", "urban", "vivid", "wired", "xenon", "yield", "zephyr",
];

const MAX_DESCRIPTION_CHARS: usize = 200;

/// Product creation request accepted by the `/product` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRequest {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub stock: u32,
    pub availability: bool,
    pub image: String,
    pub ratings: f64,
    pub discount: f64,
    pub manufacturer: String,
    pub brand: String,
    pub tags: Vec<String>,
}

impl ProductRequest {
    /// The fixed product every iteration posts by default.
    pub fn sample() -> Self {
        Self {
            name: "Sample Product".to_string(),
            description: "A high-quality sample product for testing.".to_string(),
            price: 49.99,
            category: "Electronics".to_string(),
            stock: 100,
            availability: true,
            image: "https://example.com/product-image.jpg".to_string(),
            ratings: 4.5,
            discount: 10.0,
            manufacturer: "Sample Manufacturer".to_string(),
            brand: "Sample Brand".to_string(),
            tags: vec!["electronics".into(), "sample".into(), "test".into()],
        }
    }

    /// A plausible product with randomized fields.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let name = capitalize(pick(rng, WORDS));
        let category = pick(rng, CATEGORIES).to_string();
        let price = (rng.gen_range(5.0..=500.0_f64) * 100.0).round() / 100.0;

        let word_count = rng.gen_range(8..40);
        let mut description = (0..word_count)
            .map(|_| pick(rng, WORDS))
            .collect::<Vec<_>>()
            .join(" ");
        description.truncate(MAX_DESCRIPTION_CHARS);

        let tag_count = rng.gen_range(1..=3);
        let tags = WORDS
            .choose_multiple(rng, tag_count)
            .map(|w| w.to_string())
            .collect();

        Self {
            image: format!("https://example.com/{}.jpg", name.to_lowercase()),
            manufacturer: format!("{} Manufacturing", capitalize(pick(rng, WORDS))),
            brand: capitalize(pick(rng, WORDS)),
            name,
            description,
            price,
            stock: rng.gen_range(0..1_000),
            availability: rng.gen_bool(0.9),
            ratings: (rng.gen_range(1.0..=5.0_f64) * 10.0).round() / 10.0,
            discount: rng.gen_range(0..=50) as f64,
            category,
            tags,
        }
    }
}

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Body source for each iteration.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Serialized once and shared by every iteration.
    Fixed(Bytes),
    /// A fresh [`ProductRequest::random`] per iteration.
    RandomProduct,
    /// Raw bytes loaded from a file.
    Raw { path: PathBuf, body: Bytes },
    /// No body.
    Empty,
}

impl Default for Payload {
    fn default() -> Self {
        // The sample product always serializes.
        Payload::json(&ProductRequest::sample()).unwrap_or(Payload::Empty)
    }
}

impl Payload {
    /// Serialize `value` once as a fixed JSON body.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, LoadError> {
        Ok(Payload::Fixed(Bytes::from(serde_json::to_vec(value)?)))
    }

    /// Load a body verbatim from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let body = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Payload::Raw {
            path: path.to_path_buf(),
            body: Bytes::from(body),
        })
    }

    /// Parse the CLI form: `sample`, `random`, `none` or `@path`.
    pub fn parse(spec: &str) -> Result<Self, LoadError> {
        match spec {
            "sample" => Payload::json(&ProductRequest::sample()),
            "random" => Ok(Payload::RandomProduct),
            "none" => Ok(Payload::Empty),
            other => match other.strip_prefix('@') {
                Some(path) => Payload::from_file(path),
                None => Err(LoadError::Config(format!(
                    "unknown payload '{}': expected sample, random, none or @file",
                    other
                ))),
            },
        }
    }

    /// Body for one iteration.
    pub fn body(&self) -> Result<Bytes, LoadError> {
        match self {
            Payload::Fixed(body) | Payload::Raw { body, .. } => Ok(body.clone()),
            Payload::RandomProduct => {
                let product = ProductRequest::random(&mut rand::thread_rng());
                Ok(Bytes::from(serde_json::to_vec(&product)?))
            }
            Payload::Empty => Ok(Bytes::new()),
        }
    }

    /// Short label for headers and results.
    pub fn describe(&self) -> String {
        match self {
            Payload::Fixed(body) => format!("fixed ({} bytes)", body.len()),
            Payload::RandomProduct => "random product".to_string(),
            Payload::Raw { path, body } => format!("{} ({} bytes)", path.display(), body.len()),
            Payload::Empty => "none".to_string(),
        }
    }
}
