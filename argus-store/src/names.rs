//! Database name resolution.
//!
//! Human-readable database names map to snake_case file names. A fixed table
//! covers the canonical databases of the platform; anything else falls back
//! to a slugified form of the name.

/// Canonical name ↔ file pairs recognized by the store.
pub const CANONICAL_NAMES: &[(&str, &str)] = &[
    ("People & Contacts", "people_contacts.json"),
    ("Organizations & Bodies", "organizations_bodies.json"),
    ("Actionable Tasks", "actionable_tasks.json"),
    ("Key Places & Events", "key_places_events.json"),
    ("Intelligence & Transcripts", "intelligence_transcripts.json"),
    ("Documents & Evidence", "documents_evidence.json"),
    ("Agendas & Epics", "agendas_epics.json"),
    ("Identified Transgressions", "identified_transgressions.json"),
];

/// Lowercase a display name into a file stem: `" & "` and spaces become
/// underscores.
pub fn slugify(name: &str) -> String {
    name.to_lowercase().replace(" & ", "_").replace(' ', "_")
}

/// File name for a database, canonical table first, slug fallback otherwise.
pub fn canonical_file_name(database: &str) -> String {
    for (name, file) in CANONICAL_NAMES {
        if *name == database {
            return (*file).to_string();
        }
    }
    format!("{}.json", slugify(database))
}

/// Display name for a file stem when it matches a canonical database.
pub fn display_name_for_stem(stem: &str) -> Option<&'static str> {
    CANONICAL_NAMES
        .iter()
        .find(|(_, file)| file.trim_end_matches(".json") == stem)
        .map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_resolve() {
        assert_eq!(canonical_file_name("People & Contacts"), "people_contacts.json");
        assert_eq!(
            canonical_file_name("Identified Transgressions"),
            "identified_transgressions.json"
        );
    }

    #[test]
    fn unknown_names_are_slugified() {
        assert_eq!(canonical_file_name("Field Reports & Notes"), "field_reports_notes.json");
        assert_eq!(canonical_file_name("watchlist"), "watchlist.json");
    }

    #[test]
    fn stems_round_trip() {
        assert_eq!(display_name_for_stem("people_contacts"), Some("People & Contacts"));
        assert_eq!(display_name_for_stem("unknown_db"), None);
    }
}
