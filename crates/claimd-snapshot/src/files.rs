//! Snapshot file format: one encoded record per line, two files.
//!
//! `sessions.<ext>` holds every session record, `resources.<ext>` every
//! resource record; each file is a sequence of codec-encoded lines.
//! Records carry their own keys, so the maps are rebuilt from the
//! records on load. Records are written in sorted key order, so identical
//! state always produces identical files and snapshots stay diffable
//! and testable.
//!
//! Each file is written to a temp file in the same directory and then
//! renamed over the final name, so readers see either the old file or
//! the new one, never a half-written mix. The *pair* is not atomic: a
//! crash between the two renames leaves one file from each generation,
//! and the restore path treats the resulting inconsistency as "no prior
//! state".

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use claimd_model::{Codec, Resource, Session, SessionId};
use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;

use crate::SnapshotError;

/// File stem for the session table.
const SESSIONS_STEM: &str = "sessions";
/// File stem for the resource table.
const RESOURCES_STEM: &str = "resources";

/// Decoded snapshot pair, keyed the way the engine wants them.
pub type SnapshotTables = (HashMap<SessionId, Session>, HashMap<String, Resource>);

/// Writes both snapshot files, creating the directory if needed.
pub fn write_snapshot<C: Codec>(
    dir: &Path,
    sessions: &HashMap<SessionId, Session>,
    resources: &HashMap<String, Resource>,
    codec: &C,
) -> Result<(), SnapshotError> {
    ensure_dir(dir)?;

    let mut session_records: Vec<&Session> = sessions.values().collect();
    session_records.sort_by(|a, b| a.id.cmp(&b.id));
    write_records(dir, SESSIONS_STEM, &session_records, codec)?;

    let mut resource_records: Vec<&Resource> = resources.values().collect();
    resource_records.sort_by(|a, b| a.name.cmp(&b.name));
    write_records(dir, RESOURCES_STEM, &resource_records, codec)?;

    Ok(())
}

/// Loads both snapshot files.
///
/// Returns `Ok(None)` when either file is absent: a fresh deployment,
/// or a deployment that never got as far as a full pair. Anything
/// unreadable or undecodable is an error the caller downgrades to
/// "start empty".
pub fn load_snapshot<C: Codec>(
    dir: &Path,
    codec: &C,
) -> Result<Option<SnapshotTables>, SnapshotError> {
    let Some(session_records) = read_records::<Session, C>(&file_path(dir, SESSIONS_STEM, codec), codec)?
    else {
        return Ok(None);
    };
    let Some(resource_records) =
        read_records::<Resource, C>(&file_path(dir, RESOURCES_STEM, codec), codec)?
    else {
        return Ok(None);
    };

    let sessions = session_records
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();
    let resources = resource_records
        .into_iter()
        .map(|r| (r.name.clone(), r))
        .collect();
    Ok(Some((sessions, resources)))
}

fn file_path<C: Codec>(dir: &Path, stem: &str, codec: &C) -> PathBuf {
    dir.join(format!("{stem}.{}", codec.extension()))
}

fn ensure_dir(dir: &Path) -> Result<(), SnapshotError> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

fn write_records<T: Serialize, C: Codec>(
    dir: &Path,
    stem: &str,
    records: &[&T],
    codec: &C,
) -> Result<(), SnapshotError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    for record in records {
        tmp.write_all(&codec.encode(record)?)?;
        tmp.write_all(b"\n")?;
    }
    tmp.flush()?;
    tmp.persist(file_path(dir, stem, codec))
        .map_err(|e| SnapshotError::Io(e.error))?;
    Ok(())
}

fn read_records<T: DeserializeOwned, C: Codec>(
    path: &Path,
    codec: &C,
) -> Result<Option<Vec<T>>, SnapshotError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        records.push(
            codec
                .decode(line.as_bytes())
                .map_err(SnapshotError::Corrupt)?,
        );
    }
    Ok(Some(records))
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use claimd_model::JsonCodec;

    fn sample_tables() -> SnapshotTables {
        let issuer = Session {
            id: SessionId::from("a-issuer"),
            name: "issuer".into(),
            src: "ANY".into(),
            ttl_ms: 5000,
            claimed: Vec::new(),
            issued: Vec::new(),
        };
        let ticket = claimd_model::Ticket {
            name: "job-1".into(),
            resource_name: "queue".into(),
            data: b"payload".to_vec(),
            issuer: Some(Box::new(issuer.stub())),
            claimant: None,
        };
        let resource = Resource {
            name: "queue".into(),
            is_lock: false,
            tickets: std::collections::BTreeMap::from([("job-1".to_string(), ticket.clone())]),
        };
        let mut issuer = issuer;
        issuer.issued.push(ticket);

        (
            HashMap::from([(issuer.id.clone(), issuer)]),
            HashMap::from([(resource.name.clone(), resource)]),
        )
    }

    #[test]
    fn test_write_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let (sessions, resources) = sample_tables();

        write_snapshot(dir.path(), &sessions, &resources, &JsonCodec).unwrap();
        let (loaded_sessions, loaded_resources) =
            load_snapshot(dir.path(), &JsonCodec)
                .unwrap()
                .expect("both files present");

        assert_eq!(loaded_sessions, sessions);
        assert_eq!(loaded_resources, resources);
    }

    #[test]
    fn test_write_is_deterministic_for_identical_state() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let (sessions, resources) = sample_tables();

        write_snapshot(dir_a.path(), &sessions, &resources, &JsonCodec).unwrap();
        write_snapshot(dir_b.path(), &sessions, &resources, &JsonCodec).unwrap();

        for stem in ["sessions", "resources"] {
            let a = fs::read(dir_a.path().join(format!("{stem}.jsonl"))).unwrap();
            let b = fs::read(dir_b.path().join(format!("{stem}.jsonl"))).unwrap();
            assert_eq!(a, b, "{stem} files should be byte-identical");
        }
    }

    #[test]
    fn test_load_empty_dir_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_snapshot(dir.path(), &JsonCodec).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_with_one_file_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let (sessions, resources) = sample_tables();
        write_snapshot(dir.path(), &sessions, &resources, &JsonCodec).unwrap();
        fs::remove_file(dir.path().join("resources.jsonl")).unwrap();

        let loaded = load_snapshot(dir.path(), &JsonCodec).unwrap();
        assert!(loaded.is_none(), "a torn pair counts as no prior state");
    }

    #[test]
    fn test_load_truncated_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (sessions, resources) = sample_tables();
        write_snapshot(dir.path(), &sessions, &resources, &JsonCodec).unwrap();
        // Chop the sessions file mid-record.
        let path = dir.path().join("sessions.jsonl");
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        let result = load_snapshot(dir.path(), &JsonCodec);
        assert!(matches!(result, Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn test_write_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("snaps");
        let (sessions, resources) = sample_tables();

        write_snapshot(&nested, &sessions, &resources, &JsonCodec).unwrap();

        assert!(nested.join("sessions.jsonl").is_file());
        assert!(nested.join("resources.jsonl").is_file());
    }

    #[test]
    fn test_empty_tables_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(dir.path(), &HashMap::new(), &HashMap::new(), &JsonCodec).unwrap();

        let (sessions, resources) = load_snapshot(dir.path(), &JsonCodec)
            .unwrap()
            .expect("files exist even when empty");
        assert!(sessions.is_empty());
        assert!(resources.is_empty());
    }
}
