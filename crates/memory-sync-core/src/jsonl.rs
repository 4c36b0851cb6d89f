use crate::error::{Result, SyncError};
use crate::types::Record;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Writes one JSON record per line, replacing any existing file.
pub fn write_records(path: &Path, records: &[Record]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| SyncError::io(parent, error))?;
    }
    let file = File::create(path).map_err(|error| SyncError::io(path, error))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer
            .write_all(b"\n")
            .map_err(|error| SyncError::io(path, error))?;
    }
    writer.flush().map_err(|error| SyncError::io(path, error))?;
    Ok(())
}

/// Reads a log written by [`write_records`]. Blank lines are ignored; a line
/// that does not parse is logged and skipped.
pub fn read_records(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path).map_err(|error| SyncError::io(path, error))?;
    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|error| SyncError::io(path, error))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(&line) {
            Ok(record) if record.content.trim().is_empty() => {
                log::warn!("{}:{}: skipping empty memory", path.display(), index + 1);
            }
            Ok(record) => records.push(record),
            Err(error) => log::warn!("{}:{}: skipping line: {error}", path.display(), index + 1),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::{read_records, write_records};
    use crate::types::Record;
    use std::fs;

    fn record(content: &str, weight: Option<f64>, model: Option<&str>) -> Record {
        Record {
            content: content.to_string(),
            created_at: 10,
            updated_at: 20,
            weight,
            model: model.map(str::to_string),
            server_id: None,
        }
    }

    #[test]
    fn writes_one_line_per_record_including_duplicates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("out").join("memories.jsonl");
        let records = vec![
            record("likes tea", Some(1.0), Some("gpt-4o")),
            record("multi\nline", None, None),
            record("likes tea", None, None),
        ];
        write_records(&path, &records).expect("write");

        let text = fs::read_to_string(&path).expect("read");
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().next().expect("first").starts_with(r#"{"content":"likes tea","created_at":10"#));

        let back = read_records(&path).expect("read back");
        assert_eq!(back.len(), 3);
        assert_eq!(back[0].model.as_deref(), Some("gpt-4o"));
        assert_eq!(back[1].content, "multi\nline");
        assert_eq!(back[2].weight, None);
    }

    #[test]
    fn unreadable_lines_are_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("memories.jsonl");
        fs::write(
            &path,
            "{\"content\":\"ok\",\"created_at\":1,\"updated_at\":1}\n\nnot json\n{\"content\":\" \",\"created_at\":1,\"updated_at\":1}\n",
        )
        .expect("write");
        let records = read_records(&path).expect("read");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "ok");
    }

    #[test]
    fn missing_log_is_an_io_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(read_records(&temp.path().join("absent.jsonl")).is_err());
    }
}
