use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use ratatui::crossterm::event::KeyEvent;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum RvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server answered {0}: {1}")]
    Status(u16, String),
    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Config(#[from] toml::de::Error),
    #[error("Clipboard error: {0}")]
    Clipboard(#[from] arboard::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("The request worker stopped")]
    WorkerStopped,
}

pub const HELP_TEXT: &str = "\
 o        select a PDF file to upload
 p        cycle the position of the upload
 u        upload the selected file
 R        assign random ranks to all files
 r, F5    reload the file list
 n d s k  sort by name, date, position, rank (again to flip)
 0        show all ranks
 1-5      show only files with that rank
 ↑ ↓      move the selection
 PgUp/Dn  move the selection by a page
 g G      jump to first / last file
 Enter    show file details
 w        download the selected file
 y        copy the selected file name
 ?        this help
 Esc      close popup
 q        quit";

/// Job role a resume is submitted for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Position {
    Manager,
    Administrator,
    Engineer,
    Developer,
    Analyst,
    /// Anything the server returns that is not one of the known roles.
    Other(String),
}

impl Position {
    /// The roles a user can pick for an upload, in menu order.
    pub const SELECTABLE: [Position; 5] = [
        Position::Manager,
        Position::Administrator,
        Position::Engineer,
        Position::Developer,
        Position::Analyst,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Position::Manager => "Manager",
            Position::Administrator => "Administrator",
            Position::Engineer => "Engineer",
            Position::Developer => "Developer",
            Position::Analyst => "Analyst",
            Position::Other(s) => s,
        }
    }

    /// Next entry of the position menu, where `None` is "Select Position".
    pub fn cycle(current: Option<&Position>) -> Option<Position> {
        let idx = current.and_then(|p| Self::SELECTABLE.iter().position(|s| s == p));
        match idx {
            None => Some(Self::SELECTABLE[0].clone()),
            Some(i) if i + 1 < Self::SELECTABLE.len() => Some(Self::SELECTABLE[i + 1].clone()),
            Some(_) => None,
        }
    }
}

impl FromStr for Position {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let position = Self::SELECTABLE
            .iter()
            .find(|p| p.as_str() == s.trim())
            .cloned()
            .unwrap_or_else(|| Position::Other(s.to_string()));
        Ok(position)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rank between 1 and 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rank(u8);

impl Rank {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Option<Rank> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Rank(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload date as sent by the server. The raw text is what gets displayed,
/// the parsed value is what gets sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionDate {
    pub raw: String,
    pub parsed: Option<NaiveDateTime>,
}

impl SubmissionDate {
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        let parsed = DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.naive_utc())
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
            .ok()
            .or_else(|| {
                ["%Y-%m-%d", "%m/%d/%Y"]
                    .iter()
                    .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            });
        SubmissionDate {
            raw: raw.to_string(),
            parsed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    pub submission_date: SubmissionDate,
    pub position: Position,
    pub rank: Option<Rank>,
}

impl FileRecord {
    /// Rank as shown in the table.
    pub fn rank_label(&self) -> String {
        self.rank
            .map(|r| r.to_string())
            .unwrap_or_else(|| "Unranked".to_string())
    }
}

/// One entry of `GET /files`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    pub metadata: RemoteMetadata,
}

/// Metadata the server stores per file, also the body of `GET /file-stats/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteMetadata {
    pub upload_date: String,
    pub position: String,
}

impl From<RemoteFile> for FileRecord {
    fn from(remote: RemoteFile) -> Self {
        let Ok(position) = remote.metadata.position.parse();
        FileRecord {
            submission_date: SubmissionDate::parse(&remote.metadata.upload_date),
            position,
            name: remote.name,
            rank: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    SubmissionDate,
    Position,
    Rank,
}

impl SortKey {
    pub const COLUMNS: [SortKey; 4] = [
        SortKey::Name,
        SortKey::SubmissionDate,
        SortKey::Position,
        SortKey::Rank,
    ];

    pub fn title(self) -> &'static str {
        match self {
            SortKey::Name => "Name",
            SortKey::SubmissionDate => "Submission Date",
            SortKey::Position => "Position",
            SortKey::Rank => "Rank",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortConfig {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortConfig {
    fn default() -> Self {
        SortConfig {
            key: SortKey::Name,
            direction: SortDirection::Ascending,
        }
    }
}

impl SortConfig {
    /// Sorting by the active column flips the direction, any other column
    /// starts ascending.
    pub fn toggle(self, key: SortKey) -> Self {
        let direction = if self.key == key && self.direction == SortDirection::Ascending {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        };
        SortConfig { key, direction }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notification {
    pub fn info(text: impl Into<String>) -> Self {
        Notification {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Notification {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Notification {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

/// Side effects requested by the model and executed by the request worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    FetchFiles,
    Upload { file: PathBuf, position: Position },
    FileStats { name: String },
    Download { name: String },
    /// Handled by the ui thread, the clipboard lives there.
    CopyToClipboard(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Quit,
    Exit,
    Help,
    Enter,
    MoveUp,
    MoveDown,
    MovePageUp,
    MovePageDown,
    MoveTop,
    MoveBottom,
    Resize(usize, usize),
    RawKey(KeyEvent),
    PickFile,
    CyclePosition,
    Upload,
    Refresh,
    RandomizeRanks,
    Sort(SortKey),
    FilterRank(Option<Rank>),
    Download,
    CopyName,
    FilesLoaded(Result<Vec<RemoteFile>, String>),
    UploadFinished(Result<(), String>),
    StatsLoaded(String, Result<RemoteMetadata, String>),
    DownloadFinished(String, Result<PathBuf, String>),
    CopyFinished(Result<String, String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_only_accepts_one_to_five() {
        assert_eq!(Rank::new(0), None);
        assert_eq!(Rank::new(1).map(Rank::get), Some(1));
        assert_eq!(Rank::new(5).map(Rank::get), Some(5));
        assert_eq!(Rank::new(6), None);
    }

    #[test]
    fn known_positions_are_parsed() {
        assert_eq!("Engineer".parse::<Position>().unwrap(), Position::Engineer);
        assert_eq!(
            "Janitor".parse::<Position>().unwrap(),
            Position::Other("Janitor".to_string())
        );
    }

    #[test]
    fn position_menu_cycles_back_to_unselected() {
        let mut current = None;
        let mut seen = Vec::new();
        for _ in 0..6 {
            current = Position::cycle(current.as_ref());
            seen.push(current.clone());
        }
        assert_eq!(seen[0], Some(Position::Manager));
        assert_eq!(seen[4], Some(Position::Analyst));
        assert_eq!(seen[5], None);
    }

    #[test]
    fn submission_dates_in_server_and_iso_format() {
        let us = SubmissionDate::parse("03/15/2024");
        let iso = SubmissionDate::parse("2024-03-15");
        assert!(us.parsed.is_some());
        assert_eq!(us.parsed, iso.parsed);
        assert_eq!(us.raw, "03/15/2024");
        assert!(SubmissionDate::parse("2024-03-15T10:00:00Z").parsed.is_some());
        assert!(SubmissionDate::parse("yesterday").parsed.is_none());
    }

    #[test]
    fn sort_toggle_flips_only_on_same_key() {
        let cfg = SortConfig::default();
        let by_rank = cfg.toggle(SortKey::Rank);
        assert_eq!(by_rank.key, SortKey::Rank);
        assert_eq!(by_rank.direction, SortDirection::Ascending);

        let again = by_rank.toggle(SortKey::Rank);
        assert_eq!(again.key, SortKey::Rank);
        assert_eq!(again.direction, SortDirection::Descending);

        assert_eq!(again.toggle(SortKey::Rank).direction, SortDirection::Ascending);
        assert_eq!(again.toggle(SortKey::Name).direction, SortDirection::Ascending);
    }

    #[test]
    fn remote_file_maps_to_unranked_record() {
        let remote: RemoteFile = serde_json::from_str(
            r#"{"name":"a.pdf","metadata":{"upload_date":"2024-01-01","position":"Engineer"}}"#,
        )
        .unwrap();
        let record = FileRecord::from(remote);
        assert_eq!(record.name, "a.pdf");
        assert_eq!(record.submission_date.raw, "2024-01-01");
        assert_eq!(record.position, Position::Engineer);
        assert_eq!(record.rank_label(), "Unranked");
    }
}
