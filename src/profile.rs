use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// JSON keys of every profile field, in document order.
pub const FIELD_KEYS: [&str; 20] = [
    "familienname",
    "vorname",
    "geburtsdatum",
    "zivilstand",
    "nationalitaet",
    "strasse",
    "plz_ort",
    "mobile",
    "email",
    "beruf",
    "arbeitgeber",
    "einkommen",
    "objekt_adresse",
    "objekt_plz_ort",
    "zimmer",
    "stockwerk",
    "bezugsdatum",
    "mietzins",
    "haustiere",
    "betreibung",
];

/// Applicant data. Every value is free text; nothing is parsed or validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub familienname: String,
    pub vorname: String,
    pub geburtsdatum: String,
    pub zivilstand: String,
    pub nationalitaet: String,
    pub strasse: String,
    pub plz_ort: String,
    pub mobile: String,
    pub email: String,
    pub beruf: String,
    pub arbeitgeber: String,
    pub einkommen: String,
    pub objekt_adresse: String,
    pub objekt_plz_ort: String,
    pub zimmer: String,
    pub stockwerk: String,
    pub bezugsdatum: String,
    pub mietzins: String,
    pub haustiere: String,
    pub betreibung: String,
}

/// Wire shape of a profile document: every key optional, nothing else allowed.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileFile {
    #[serde(default, deserialize_with = "non_null_string")]
    familienname: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    vorname: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    geburtsdatum: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    zivilstand: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    nationalitaet: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    strasse: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    plz_ort: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    mobile: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    email: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    beruf: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    arbeitgeber: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    einkommen: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    objekt_adresse: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    objekt_plz_ort: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    zimmer: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    stockwerk: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    bezugsdatum: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    mietzins: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    haustiere: Option<String>,
    #[serde(default, deserialize_with = "non_null_string")]
    betreibung: Option<String>,
}

/// Absent keys stay `None`; an explicit `null` is an error like any other non-string.
fn non_null_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer).map(Some)
}

impl Profile {
    pub fn get(&self, key: &str) -> Option<&str> {
        let value = match key {
            "familienname" => &self.familienname,
            "vorname" => &self.vorname,
            "geburtsdatum" => &self.geburtsdatum,
            "zivilstand" => &self.zivilstand,
            "nationalitaet" => &self.nationalitaet,
            "strasse" => &self.strasse,
            "plz_ort" => &self.plz_ort,
            "mobile" => &self.mobile,
            "email" => &self.email,
            "beruf" => &self.beruf,
            "arbeitgeber" => &self.arbeitgeber,
            "einkommen" => &self.einkommen,
            "objekt_adresse" => &self.objekt_adresse,
            "objekt_plz_ort" => &self.objekt_plz_ort,
            "zimmer" => &self.zimmer,
            "stockwerk" => &self.stockwerk,
            "bezugsdatum" => &self.bezugsdatum,
            "mietzins" => &self.mietzins,
            "haustiere" => &self.haustiere,
            "betreibung" => &self.betreibung,
            _ => return None,
        };
        Some(value.as_str())
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut String> {
        let value = match key {
            "familienname" => &mut self.familienname,
            "vorname" => &mut self.vorname,
            "geburtsdatum" => &mut self.geburtsdatum,
            "zivilstand" => &mut self.zivilstand,
            "nationalitaet" => &mut self.nationalitaet,
            "strasse" => &mut self.strasse,
            "plz_ort" => &mut self.plz_ort,
            "mobile" => &mut self.mobile,
            "email" => &mut self.email,
            "beruf" => &mut self.beruf,
            "arbeitgeber" => &mut self.arbeitgeber,
            "einkommen" => &mut self.einkommen,
            "objekt_adresse" => &mut self.objekt_adresse,
            "objekt_plz_ort" => &mut self.objekt_plz_ort,
            "zimmer" => &mut self.zimmer,
            "stockwerk" => &mut self.stockwerk,
            "bezugsdatum" => &mut self.bezugsdatum,
            "mietzins" => &mut self.mietzins,
            "haustiere" => &mut self.haustiere,
            "betreibung" => &mut self.betreibung,
            _ => return None,
        };
        Some(value)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        let slot = self.get_mut(key).ok_or_else(|| {
            anyhow!(
                "unknown profile field '{}' (expected one of: {})",
                key,
                FIELD_KEYS.join(", ")
            )
        })?;
        *slot = value.into();
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        FIELD_KEYS
            .iter()
            .filter_map(move |key| self.get(key).map(|value| (*key, value)))
    }

    /// Decodes a profile document. Keys missing from `json` keep the value from `defaults`.
    pub fn from_json_str(json: &str, defaults: &Profile) -> Result<Profile> {
        let parsed: ProfileFile =
            serde_json::from_str(json).with_context(|| "failed to parse profile json")?;
        let mut profile = defaults.clone();
        profile.merge(parsed);
        Ok(profile)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).with_context(|| "failed to serialize profile")
    }

    fn merge(&mut self, incoming: ProfileFile) {
        let ProfileFile {
            familienname,
            vorname,
            geburtsdatum,
            zivilstand,
            nationalitaet,
            strasse,
            plz_ort,
            mobile,
            email,
            beruf,
            arbeitgeber,
            einkommen,
            objekt_adresse,
            objekt_plz_ort,
            zimmer,
            stockwerk,
            bezugsdatum,
            mietzins,
            haustiere,
            betreibung,
        } = incoming;
        let pairs = [
            (&mut self.familienname, familienname),
            (&mut self.vorname, vorname),
            (&mut self.geburtsdatum, geburtsdatum),
            (&mut self.zivilstand, zivilstand),
            (&mut self.nationalitaet, nationalitaet),
            (&mut self.strasse, strasse),
            (&mut self.plz_ort, plz_ort),
            (&mut self.mobile, mobile),
            (&mut self.email, email),
            (&mut self.beruf, beruf),
            (&mut self.arbeitgeber, arbeitgeber),
            (&mut self.einkommen, einkommen),
            (&mut self.objekt_adresse, objekt_adresse),
            (&mut self.objekt_plz_ort, objekt_plz_ort),
            (&mut self.zimmer, zimmer),
            (&mut self.stockwerk, stockwerk),
            (&mut self.bezugsdatum, bezugsdatum),
            (&mut self.mietzins, mietzins),
            (&mut self.haustiere, haustiere),
            (&mut self.betreibung, betreibung),
        ];
        for (slot, value) in pairs {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}

/// Holds the profile being edited plus the template its documents are decoded against.
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    defaults: Profile,
    current: Profile,
}

impl ProfileStore {
    pub fn new(defaults: Profile) -> Self {
        Self {
            current: defaults.clone(),
            defaults,
        }
    }

    /// Reads the template profile that seeds every session.
    pub fn load_defaults(path: &Path) -> Result<Profile> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read profile template: {}", path.display()))?;
        Profile::from_json_str(&content, &Profile::default())
            .with_context(|| format!("invalid profile template: {}", path.display()))
    }

    pub fn current(&self) -> &Profile {
        &self.current
    }

    pub fn defaults(&self) -> &Profile {
        &self.defaults
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        self.current.set(key, value)
    }

    /// Replaces the current profile with the decoded document. On error the current
    /// profile is left exactly as it was.
    pub fn load_json_str(&mut self, json: &str) -> Result<()> {
        self.current = Profile::from_json_str(json, &self.defaults)?;
        Ok(())
    }

    pub fn load_json_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read profile: {}", path.display()))?;
        self.load_json_str(&content)
    }

    pub fn save_json_file(&self, path: &Path) -> Result<()> {
        let json = self.current.to_json_string()?;
        fs::write(path, json)
            .with_context(|| format!("failed to write profile: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::sample_profile;

    #[test]
    fn every_key_round_trips_through_get_and_set() {
        let mut profile = Profile::default();
        for (idx, key) in FIELD_KEYS.iter().enumerate() {
            profile.set(key, format!("value {}", idx)).expect("set");
        }
        for (idx, key) in FIELD_KEYS.iter().enumerate() {
            assert_eq!(profile.get(key), Some(format!("value {}", idx).as_str()));
        }
        assert_eq!(profile.entries().count(), FIELD_KEYS.len());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let mut profile = Profile::default();
        let err = profile.set("telefon", "123").unwrap_err();
        assert!(err.to_string().contains("unknown profile field 'telefon'"));
        assert_eq!(profile.get("telefon"), None);
    }

    #[test]
    fn missing_keys_keep_template_values() {
        let defaults = sample_profile();
        let profile = Profile::from_json_str(r#"{"vorname": "Erika"}"#, &defaults).expect("json");
        assert_eq!(profile.vorname, "Erika");
        assert_eq!(profile.familienname, defaults.familienname);
        assert_eq!(profile.mietzins, defaults.mietzins);
    }

    #[test]
    fn serialized_profile_uses_flat_field_names() {
        let json = sample_profile().to_json_string().expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("value");
        let object = value.as_object().expect("object");
        let mut keys: Vec<_> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        let mut expected = FIELD_KEYS.to_vec();
        expected.sort_unstable();
        assert_eq!(keys, expected);
    }

    #[test]
    fn load_failures_leave_profile_unchanged() {
        let mut store = ProfileStore::new(sample_profile());
        store.set("zimmer", "3.5").expect("set");
        let before = store.current().clone();

        assert!(store.load_json_str("{not json").is_err());
        assert!(store.load_json_str(r#"{"zimmer": 3}"#).is_err());
        assert!(store.load_json_str(r#"{"hund": "ja"}"#).is_err());
        assert!(store.load_json_str("[]").is_err());
        assert!(store.load_json_str(r#"{"vorname": null}"#).is_err());
        let missing = Path::new("/definitely/not/here/profile.json");
        assert!(store.load_json_file(missing).is_err());

        assert_eq!(store.current(), &before);
    }

    #[test]
    fn load_replaces_whole_profile() {
        let mut store = ProfileStore::new(sample_profile());
        store.set("zimmer", "3.5").expect("set");
        store
            .load_json_str(r#"{"stockwerk": "EG"}"#)
            .expect("load json");
        assert_eq!(store.current().stockwerk, "EG");
        assert_eq!(store.current().zimmer, store.defaults().zimmer);
    }

    #[test]
    fn saved_profile_loads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("profile.json");
        let mut store = ProfileStore::new(Profile::default());
        store.set("email", "max@example.org").expect("set");
        store.save_json_file(&path).expect("save");

        let mut other = ProfileStore::new(sample_profile());
        other.load_json_file(&path).expect("load");
        assert_eq!(other.current(), store.current());
    }
}
