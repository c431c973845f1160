//! Voice modulation profiles
//!
//! Each speaker gets a stable voice: either one they picked explicitly, or a
//! deterministic default derived from their user id so the same person always
//! sounds the same without storing anything.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{Result, SoriError};

/// A single voice modulation profile.
///
/// `filter_graph` is an ffmpeg audio filter description (`asetrate=…,atempo=…`);
/// `None` means the synthesized voice is played as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceProfile {
    /// Position in the catalog
    pub id: usize,
    /// ffmpeg `-af` filter description, if any
    pub filter_graph: Option<String>,
    /// Human-readable name shown in the profile picker
    pub display_name: String,
}

/// Catalog entry as it appears in `VOICE_PROFILES_JSON`
#[derive(Debug, Deserialize)]
struct ProfileSpec {
    #[serde(default)]
    filter: Option<String>,
    name: String,
}

/// Parse a profile catalog from its JSON representation.
pub fn parse_catalog(raw: &str) -> Result<Vec<VoiceProfile>> {
    let specs: Vec<ProfileSpec> = serde_json::from_str(raw)
        .map_err(|e| SoriError::config(format!("invalid voice profile catalog: {}", e)))?;

    Ok(specs
        .into_iter()
        .enumerate()
        .map(|(id, spec)| VoiceProfile {
            id,
            filter_graph: spec.filter,
            display_name: spec.name,
        })
        .collect())
}

/// Built-in catalog of ten voices.
///
/// The source voice is female, so the male variants are simulated by lowering
/// the sample rate and compensating the tempo. Pitch factor p maps to
/// `asetrate=24000*p,atempo=1/p`.
pub fn default_catalog() -> Vec<VoiceProfile> {
    let specs: [(&str, Option<&str>); 10] = [
        ("Nana (Natural)", None),
        ("Sora (Bright)", Some("asetrate=26400,atempo=0.91")),
        ("Yuna (Calm)", Some("asetrate=22800,atempo=1.05")),
        ("Minji (Young)", Some("asetrate=27600,atempo=0.9")),
        ("Harin (Mature)", Some("asetrate=21600,atempo=1.11")),
        ("Junho (Male)", Some("asetrate=18000,atempo=1.33")),
        ("Minho (Deep Male)", Some("asetrate=16800,atempo=1.43")),
        ("Seojin (Soft Male)", Some("asetrate=19200,atempo=1.25,lowpass=f=3000")),
        ("Doyoon (Crisp Male)", Some("asetrate=19680,atempo=1.22,treble=g=5")),
        ("Jiwon (Youth Male)", Some("asetrate=20400,atempo=1.18")),
    ];

    specs
        .into_iter()
        .enumerate()
        .map(|(id, (name, filter))| VoiceProfile {
            id,
            filter_graph: filter.map(str::to_string),
            display_name: name.to_string(),
        })
        .collect()
}

/// Maps speakers to voice profiles.
///
/// Explicit overrides (set through the `/voice` command) always win; everyone
/// else falls back to a hash of their user id.
#[derive(Debug)]
pub struct ProfileSelector {
    catalog: Vec<VoiceProfile>,
    overrides: HashMap<u64, usize>,
}

impl ProfileSelector {
    pub fn new(catalog: Vec<VoiceProfile>) -> Self {
        Self {
            catalog,
            overrides: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &[VoiceProfile] {
        &self.catalog
    }

    /// Resolve the profile for a speaker.
    ///
    /// Unknown speakers get the first profile. The default assignment uses the
    /// last four decimal digits of the user id, which are distributed evenly
    /// enough across users.
    pub fn resolve(&self, speaker_id: Option<u64>) -> &VoiceProfile {
        let Some(speaker_id) = speaker_id.filter(|id| *id != 0) else {
            return &self.catalog[0];
        };

        if let Some(&index) = self.overrides.get(&speaker_id) {
            if index < self.catalog.len() {
                return &self.catalog[index];
            }
        }

        let index = (speaker_id % 10_000) as usize % self.catalog.len();
        &self.catalog[index]
    }

    /// Pin a speaker to a specific profile. Last write wins.
    pub fn set_override(&mut self, speaker_id: u64, index: usize) -> Result<()> {
        if index >= self.catalog.len() {
            return Err(SoriError::validation(format!(
                "voice profile index {} is out of range (0..{})",
                index,
                self.catalog.len()
            )));
        }
        self.overrides.insert(speaker_id, index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_shape() {
        let catalog = default_catalog();
        assert_eq!(catalog.len(), 10);
        assert!(catalog[0].filter_graph.is_none());
        assert!(catalog[1..].iter().all(|p| p.filter_graph.is_some()));
        for (i, profile) in catalog.iter().enumerate() {
            assert_eq!(profile.id, i);
        }
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let selector = ProfileSelector::new(default_catalog());
        let first = selector.resolve(Some(123_456_789_012)).id;
        let second = selector.resolve(Some(123_456_789_012)).id;
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_uses_trailing_digits() {
        let selector = ProfileSelector::new(default_catalog());
        // 9_007 -> last four digits 9007 -> 9007 % 10 == 7
        assert_eq!(selector.resolve(Some(555_000_009_007)).id, 7);
        assert_eq!(selector.resolve(Some(9_007)).id, 7);
    }

    #[test]
    fn test_missing_speaker_gets_first_profile() {
        let selector = ProfileSelector::new(default_catalog());
        assert_eq!(selector.resolve(None).id, 0);
        assert_eq!(selector.resolve(Some(0)).id, 0);
    }

    #[test]
    fn test_override_beats_hash() {
        let mut selector = ProfileSelector::new(default_catalog());
        let hashed = selector.resolve(Some(42)).id;
        let wanted = (hashed + 3) % 10;

        selector.set_override(42, wanted).unwrap();
        assert_eq!(selector.resolve(Some(42)).id, wanted);

        // last write wins
        selector.set_override(42, 1).unwrap();
        assert_eq!(selector.resolve(Some(42)).id, 1);
    }

    #[test]
    fn test_override_out_of_range() {
        let mut selector = ProfileSelector::new(default_catalog());
        let err = selector.set_override(42, 10).unwrap_err();
        assert!(matches!(err, SoriError::Validation(_)));
        // failed override leaves the default in place
        let hashed = (42u64 % 10_000) as usize % 10;
        assert_eq!(selector.resolve(Some(42)).id, hashed);
    }

    #[test]
    fn test_parse_catalog() {
        let catalog = parse_catalog(
            r#"[{"filter": null, "name": "Plain"}, {"filter": "asetrate=26400", "name": "High"}]"#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].display_name, "Plain");
        assert!(catalog[0].filter_graph.is_none());
        assert_eq!(catalog[1].filter_graph.as_deref(), Some("asetrate=26400"));
        assert_eq!(catalog[1].id, 1);
    }

    #[test]
    fn test_parse_catalog_rejects_garbage() {
        assert!(matches!(
            parse_catalog("not json").unwrap_err(),
            SoriError::Config(_)
        ));
    }
}
