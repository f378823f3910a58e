//! Append-only ledger of finished runs, one line per run.
//!
//! ```text
//! run v1 id:<sha256 hex> player:<address> score:<n> level:<n> duration_ms:<n> rounds:<n> at_ms:<n>
//! ```
//!
//! The id is computed by the writer over [`RunEntry::canonical_text`], so a
//! retried write of the same run is recognised and not appended twice.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_LEDGER_PATH: &str = "data/runs.ledger";
const LINE_TAG: &str = "run";
const LINE_VERSION: &str = "v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEntry {
    pub id: String,
    pub player: String,
    pub score: u32,
    pub level: u32,
    pub duration_ms: u64,
    pub rounds: u32,
    pub recorded_at_ms: u64,
}

impl RunEntry {
    /// Every field except the id, in wire order.
    pub fn canonical_text(&self) -> String {
        format!(
            "player:{} score:{} level:{} duration_ms:{} rounds:{} at_ms:{}",
            self.player, self.score, self.level, self.duration_ms, self.rounds, self.recorded_at_ms
        )
    }
}

#[derive(Debug)]
pub enum LedgerError {
    Io { path: PathBuf, source: io::Error },
    Parse { line: usize, message: String },
    InvalidField { field: &'static str, value: String },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Io { path, source } => {
                write!(f, "ledger io failed at {}: {source}", path.display())
            }
            LedgerError::Parse { line, message } => {
                write!(f, "ledger line {line} is malformed: {message}")
            }
            LedgerError::InvalidField { field, value } => {
                write!(f, "invalid {field} value '{value}'")
            }
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedgerError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    AlreadyPresent,
}

pub fn encode_entry(entry: &RunEntry) -> Result<String, LedgerError> {
    if entry.id.is_empty() || !entry.id.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(LedgerError::InvalidField {
            field: "id",
            value: entry.id.clone(),
        });
    }
    if entry.player.is_empty() || entry.player.chars().any(char::is_whitespace) {
        return Err(LedgerError::InvalidField {
            field: "player",
            value: entry.player.clone(),
        });
    }
    Ok(format!(
        "{LINE_TAG} {LINE_VERSION} id:{} {}",
        entry.id,
        entry.canonical_text()
    ))
}

pub fn parse_entry(line: &str) -> Result<RunEntry, String> {
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some(LINE_TAG) {
        return Err(format!("expected leading '{LINE_TAG}'"));
    }
    match tokens.next() {
        Some(LINE_VERSION) => {}
        Some(other) => return Err(format!("unsupported version '{other}'")),
        None => return Err("missing version".to_string()),
    }

    let mut id = None;
    let mut player = None;
    let mut score = None;
    let mut level = None;
    let mut duration_ms = None;
    let mut rounds = None;
    let mut recorded_at_ms = None;
    for token in tokens {
        let (key, value) = token
            .split_once(':')
            .ok_or_else(|| format!("expected key:value, got '{token}'"))?;
        match key {
            "id" => id = Some(value.to_string()),
            "player" => player = Some(value.to_string()),
            "score" => score = Some(parse_number(key, value)?),
            "level" => level = Some(parse_number(key, value)?),
            "duration_ms" => duration_ms = Some(parse_number(key, value)?),
            "rounds" => rounds = Some(parse_number(key, value)?),
            "at_ms" => recorded_at_ms = Some(parse_number(key, value)?),
            _ => {}
        }
    }

    Ok(RunEntry {
        id: id.ok_or("missing id")?,
        player: player.ok_or("missing player")?,
        score: score.ok_or("missing score")?,
        level: level.ok_or("missing level")?,
        duration_ms: duration_ms.ok_or("missing duration_ms")?,
        rounds: rounds.ok_or("missing rounds")?,
        recorded_at_ms: recorded_at_ms.ok_or("missing at_ms")?,
    })
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("invalid {key} value '{value}'"))
}

/// A line that could not be parsed, 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    pub line: usize,
    pub message: String,
}

/// Every parseable entry of a ledger plus the lines that were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerScan {
    pub entries: Vec<RunEntry>,
    pub malformed: Vec<MalformedLine>,
}

fn read_ledger_text(path: &Path) -> Result<String, LedgerError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(source) => Err(LedgerError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn scan_text(content: &str) -> LedgerScan {
    let mut scan = LedgerScan::default();
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_entry(trimmed) {
            Ok(entry) => scan.entries.push(entry),
            Err(message) => scan.malformed.push(MalformedLine {
                line: index + 1,
                message,
            }),
        }
    }
    scan
}

/// Like [`read_ledger`] but keeps going past lines that do not parse, such
/// as a record torn by a crash mid-write.
pub fn scan_ledger(path: &Path) -> Result<LedgerScan, LedgerError> {
    Ok(scan_text(&read_ledger_text(path)?))
}

/// Blank lines and `#` comments are skipped. A missing file is an empty ledger.
/// The first malformed line is an error.
pub fn read_ledger(path: &Path) -> Result<Vec<RunEntry>, LedgerError> {
    let scan = scan_ledger(path)?;
    match scan.malformed.into_iter().next() {
        Some(MalformedLine { line, message }) => Err(LedgerError::Parse { line, message }),
        None => Ok(scan.entries),
    }
}

pub fn append_entry(path: &Path, entry: &RunEntry) -> Result<AppendOutcome, LedgerError> {
    append_entry_reporting(path, entry).map(|(outcome, _)| outcome)
}

/// Appends `entry` unless its id is already recorded. Malformed lines are
/// skipped for the id check and returned so the caller can report them. A
/// torn last line is terminated first so the new record starts on its own
/// line.
pub fn append_entry_reporting(
    path: &Path,
    entry: &RunEntry,
) -> Result<(AppendOutcome, Vec<MalformedLine>), LedgerError> {
    let line = encode_entry(entry)?;
    let content = read_ledger_text(path)?;
    let scan = scan_text(&content);
    if scan.entries.iter().any(|existing| existing.id == entry.id) {
        return Ok((AppendOutcome::AlreadyPresent, scan.malformed));
    }

    let io_error = |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error)?;
    if !content.is_empty() && !content.ends_with('\n') {
        writeln!(file).map_err(io_error)?;
    }
    writeln!(file, "{line}").map_err(io_error)?;
    file.flush().map_err(io_error)?;
    Ok((AppendOutcome::Appended, scan.malformed))
}

/// Entries recorded by `player`, most recent first.
pub fn records_for(entries: &[RunEntry], player: &str) -> Vec<RunEntry> {
    let mut records = entries
        .iter()
        .rev()
        .filter(|entry| entry.player == player)
        .cloned()
        .collect::<Vec<_>>();
    records.sort_by(|a, b| b.recorded_at_ms.cmp(&a.recorded_at_ms));
    records
}

pub fn format_profile(player: &str, records: &[RunEntry]) -> String {
    let mut lines = vec!["Profile Details".to_string(), format!("player: {player}")];
    if records.is_empty() {
        lines.push("no runs recorded".to_string());
        return lines.join("\n");
    }

    lines.push(format!("runs: {}", records.len()));
    lines.push(String::new());
    lines.push(format!(
        "{:>3}  {:>7}  {:>5}  {:>6}  {:>10}  {}",
        "#", "score", "level", "rounds", "duration", "record"
    ));
    for (index, record) in records.iter().enumerate() {
        lines.push(format!(
            "{:>3}  {:>7}  {:>5}  {:>6}  {:>10}  {}",
            index + 1,
            record.score,
            record.level,
            record.rounds,
            format_duration(record.duration_ms),
            short_id(&record.id)
        ));
    }
    lines.join("\n")
}

fn format_duration(duration_ms: u64) -> String {
    format!("{}.{:02}s", duration_ms / 1000, (duration_ms % 1000) / 10)
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

pub enum CommandKind {
    Profile { player: String },
    List,
}

pub fn run<W: Write>(kind: CommandKind, ledger_path: &Path, stdout: &mut W) -> Result<(), String> {
    let LedgerScan { entries, malformed } =
        scan_ledger(ledger_path).map_err(|error| error.to_string())?;
    for skipped in &malformed {
        writeln!(
            stdout,
            "warning: skipped ledger line {}: {}",
            skipped.line, skipped.message
        )
        .map_err(|error| format!("failed to write output: {error}"))?;
    }
    let output = match kind {
        CommandKind::Profile { player } => format_profile(&player, &records_for(&entries, &player)),
        CommandKind::List => {
            let mut players = entries
                .iter()
                .map(|entry| entry.player.as_str())
                .collect::<Vec<_>>();
            players.sort_unstable();
            players.dedup();
            if players.is_empty() {
                "no runs recorded".to_string()
            } else {
                players
                    .iter()
                    .map(|player| {
                        let count = entries.iter().filter(|entry| entry.player == *player).count();
                        format!("{player} {count}")
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
    };
    writeln!(stdout, "{output}").map_err(|error| format!("failed to write output: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(id: &str, player: &str, score: u32, at_ms: u64) -> RunEntry {
        RunEntry {
            id: id.to_string(),
            player: player.to_string(),
            score,
            level: 2,
            duration_ms: 12_345,
            rounds: 2,
            recorded_at_ms: at_ms,
        }
    }

    #[test]
    fn encoded_line_parses_back() {
        let original = entry("ab12", "0xabc", 40, 1_700_000_000_000);
        let line = encode_entry(&original).expect("encode");

        assert_eq!(
            line,
            "run v1 id:ab12 player:0xabc score:40 level:2 duration_ms:12345 rounds:2 at_ms:1700000000000"
        );
        assert_eq!(parse_entry(&line), Ok(original));
    }

    #[test]
    fn parse_rejects_bad_lines() {
        assert!(parse_entry("walk v1 id:aa").is_err());
        assert!(parse_entry("run v2 id:aa").is_err());
        assert!(parse_entry("run v1 id:aa player:p score:x level:1 duration_ms:1 rounds:1 at_ms:1")
            .is_err());
        assert!(parse_entry("run v1 id:aa player:p").is_err());
    }

    #[test]
    fn parse_ignores_unknown_keys() {
        let parsed = parse_entry(
            "run v1 id:aa player:p score:1 level:1 duration_ms:1 rounds:1 at_ms:1 mode:solo",
        )
        .expect("parse");
        assert_eq!(parsed.player, "p");
    }

    #[test]
    fn player_with_whitespace_is_rejected() {
        let bad = entry("aa", "two words", 1, 1);
        assert!(matches!(
            encode_entry(&bad),
            Err(LedgerError::InvalidField { field: "player", .. })
        ));
    }

    #[test]
    fn missing_ledger_reads_as_empty() {
        let temp = TempDir::new().expect("temp dir");
        let entries = read_ledger(&temp.path().join("runs.ledger")).expect("read");
        assert!(entries.is_empty());
    }

    #[test]
    fn append_is_idempotent_per_id() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("data").join("runs.ledger");
        let run = entry("ff00", "p1", 10, 5);

        assert_eq!(append_entry(&path, &run).expect("append"), AppendOutcome::Appended);
        assert_eq!(
            append_entry(&path, &run).expect("append again"),
            AppendOutcome::AlreadyPresent
        );
        assert_eq!(read_ledger(&path).expect("read"), vec![run]);
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("runs.ledger");
        fs::write(&path, "# header\n\nrun v1 garbage\n").expect("write");

        match read_ledger(&path) {
            Err(LedgerError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn append_after_a_torn_line_still_records() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("runs.ledger");
        let first = entry("aa", "p1", 7, 1);
        append_entry(&path, &first).expect("append");
        let mut content = fs::read_to_string(&path).expect("read");
        content.push_str("run v1 id:bb player:p1 sco");
        fs::write(&path, content).expect("tear");

        let second = entry("cc", "p1", 9, 2);
        let (outcome, malformed) = append_entry_reporting(&path, &second).expect("append");
        assert_eq!(outcome, AppendOutcome::Appended);
        assert_eq!(malformed.len(), 1);
        assert_eq!(malformed[0].line, 2);
        assert_eq!(
            append_entry(&path, &first).expect("append again"),
            AppendOutcome::AlreadyPresent
        );

        let scan = scan_ledger(&path).expect("scan");
        assert_eq!(scan.entries, vec![first, second]);
        assert_eq!(scan.malformed.len(), 1);
        assert!(read_ledger(&path).is_err());
    }

    #[test]
    fn run_reports_skipped_lines_and_keeps_going() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("runs.ledger");
        fs::write(&path, "run v1 garbage\n").expect("write");
        append_entry(&path, &entry("aa", "p1", 7, 1)).expect("append");

        let mut stdout = Vec::new();
        run(CommandKind::List, &path, &mut stdout).expect("run");
        let text = String::from_utf8(stdout).expect("utf8");
        assert!(text.starts_with("warning: skipped ledger line 1:"));
        assert!(text.ends_with("p1 1\n"));
    }

    #[test]
    fn records_for_filters_and_orders_most_recent_first() {
        let entries = vec![
            entry("01", "p1", 10, 100),
            entry("02", "p2", 20, 200),
            entry("03", "p1", 30, 300),
        ];
        let records = records_for(&entries, "p1");
        assert_eq!(
            records.iter().map(|record| record.score).collect::<Vec<_>>(),
            vec![30, 10]
        );
        assert!(records_for(&entries, "nobody").is_empty());
    }

    #[test]
    fn profile_text_covers_empty_and_filled() {
        let empty = format_profile("p1", &[]);
        assert!(empty.starts_with("Profile Details"));
        assert!(empty.ends_with("no runs recorded"));

        let filled = format_profile("p1", &[entry("0123456789abcdef", "p1", 30, 300)]);
        assert!(filled.contains("runs: 1"));
        assert!(filled.contains("12.34s"));
        assert!(filled.contains("0123456789ab"));
        assert!(!filled.contains("0123456789abc "));
    }

    #[test]
    fn run_profile_writes_table_to_stdout() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("runs.ledger");
        append_entry(&path, &entry("aa", "p1", 7, 1)).expect("append");

        let mut stdout = Vec::new();
        run(
            CommandKind::Profile {
                player: "p1".to_string(),
            },
            &path,
            &mut stdout,
        )
        .expect("run");
        let text = String::from_utf8(stdout).expect("utf8");
        assert!(text.contains("Profile Details"));
        assert!(text.contains("runs: 1"));
    }

    #[test]
    fn run_list_counts_players() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("runs.ledger");
        append_entry(&path, &entry("aa", "p2", 7, 1)).expect("append");
        append_entry(&path, &entry("bb", "p1", 7, 2)).expect("append");
        append_entry(&path, &entry("cc", "p2", 7, 3)).expect("append");

        let mut stdout = Vec::new();
        run(CommandKind::List, &path, &mut stdout).expect("run");
        assert_eq!(String::from_utf8(stdout).expect("utf8"), "p1 1\np2 2\n");
    }
}
