use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rand::Rng;
use ratatui::crossterm::event::KeyEvent;
use tracing::{debug, error, info, trace, warn};

use crate::config::expand;
use crate::domain::{
    Command, FileRecord, HELP_TEXT, Message, Notification, Position, Rank, RemoteFile,
    RemoteMetadata, SortConfig, SortKey,
};
use crate::inputter::{InputResult, Inputter};
use crate::table::displayed_indices;
use crate::ui::{STATIC_ROWS, TABLE_HEADER_HEIGHT};

pub const SELECT_FILE_WARNING: &str = "Please select a file and a position before uploading.";
pub const PDF_ONLY_WARNING: &str = "Only PDF files can be uploaded.";
pub const UPLOAD_RUNNING_WARNING: &str = "An upload is already running, please wait.";
pub const UPLOAD_SUCCESS: &str = "File uploaded successfully.";
pub const UPLOAD_FAILURE: &str = "Failed to upload the file. Please try again.";

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Status {
    READY,
    QUITTING,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Modus {
    TABLE,
    POPUP,
    HELP,
    CMDINPUT,
}

/// File and position picked for the next upload.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PendingUpload {
    pub file: Option<PathBuf>,
    pub position: Option<Position>,
}

/// Requests that have been handed to the worker and not answered yet.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct InFlight {
    pub fetch: bool,
    pub upload: bool,
}

pub struct Model {
    pub status: Status,
    modus: Modus,
    files: Vec<FileRecord>,
    rows: Vec<usize>, // Display order, indices into files
    sort: SortConfig,
    rank_filter: Option<Rank>,
    pending: PendingUpload,
    in_flight: InFlight,
    fetch_error: Option<String>,
    notification: Option<Notification>,
    cursor_row: usize,
    offset_row: usize,
    table_height: usize,
    input: Inputter,
    last_input: InputResult,
    status_message: String,
    last_status_message_update: Instant,
}

impl Model {
    pub fn init(ui_height: usize) -> Self {
        Self {
            status: Status::READY,
            modus: Modus::TABLE,
            files: Vec::new(),
            rows: Vec::new(),
            sort: SortConfig::default(),
            rank_filter: None,
            pending: PendingUpload::default(),
            in_flight: InFlight::default(),
            fetch_error: None,
            notification: None,
            cursor_row: 0,
            offset_row: 0,
            table_height: Self::table_height_for(ui_height),
            input: Inputter::default(),
            last_input: InputResult::default(),
            status_message: "Started rv!".to_string(),
            last_status_message_update: Instant::now(),
        }
    }

    /// Applies one message. The old state is consumed and the new one is
    /// returned together with the request the runtime has to send, if any.
    pub fn update<R: Rng>(mut self, message: Message, rng: &mut R) -> (Self, Option<Command>) {
        trace!("Update: Modus {:?}, Message {:?}", self.modus, message);
        let command = match message {
            // Responses are handled no matter what the user is looking at
            Message::FilesLoaded(result) => {
                self.files_loaded(result);
                None
            }
            Message::UploadFinished(result) => self.upload_finished(result),
            Message::StatsLoaded(name, result) => {
                self.stats_loaded(&name, result);
                None
            }
            Message::DownloadFinished(name, result) => {
                self.download_finished(&name, result);
                None
            }
            Message::CopyFinished(result) => {
                self.copy_finished(result);
                None
            }
            Message::Resize(_, height) => {
                self.ui_resize(height);
                None
            }
            msg => match self.modus {
                Modus::TABLE => self.handle_table(msg, rng),
                Modus::POPUP | Modus::HELP => {
                    match msg {
                        Message::Quit => self.quit(),
                        Message::Enter | Message::Exit => self.exit(),
                        _ => (),
                    }
                    None
                }
                Modus::CMDINPUT => {
                    if let Message::RawKey(key) = msg {
                        self.raw_input(key)
                    }
                    None
                }
            },
        };
        (self, command)
    }

    fn handle_table<R: Rng>(&mut self, message: Message, rng: &mut R) -> Option<Command> {
        match message {
            Message::Upload => return self.upload(),
            Message::Refresh => return self.refresh(),
            Message::Enter => return self.details(),
            Message::Download => return self.download(),
            Message::CopyName => return self.copy_name(),
            Message::Quit => self.quit(),
            Message::Help => self.show_help(),
            Message::MoveUp => self.move_selection_up(1),
            Message::MoveDown => self.move_selection_down(1),
            Message::MovePageUp => self.move_selection_up(self.table_height.max(1)),
            Message::MovePageDown => self.move_selection_down(self.table_height.max(1)),
            Message::MoveTop => self.move_selection_up(self.rows.len()),
            Message::MoveBottom => self.move_selection_down(self.rows.len()),
            Message::PickFile => self.pick_file(),
            Message::CyclePosition => self.cycle_position(),
            Message::RandomizeRanks => self.randomize_ranks(rng),
            Message::Sort(key) => self.sort_by(key),
            Message::FilterRank(rank) => self.filter_rank(rank),
            _ => (),
        }
        None
    }

    // -------------------- Control handling functions ---------------------- //

    pub fn raw_keyevents(&self) -> bool {
        self.modus == Modus::CMDINPUT
    }

    fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn exit(&mut self) {
        self.notification = None;
        self.modus = Modus::TABLE;
    }

    fn show_help(&mut self) {
        self.modus = Modus::HELP;
    }

    fn notify(&mut self, notification: Notification) {
        debug!("Notify {:?}", notification);
        self.notification = Some(notification);
        // Shown once the prompt is closed
        if self.modus != Modus::CMDINPUT {
            self.modus = Modus::POPUP;
        }
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.last_status_message_update = Instant::now();
    }

    fn ui_resize(&mut self, height: usize) {
        trace!("UI was resized! h:{}", height);
        self.table_height = Self::table_height_for(height);
        self.clamp_selection();
    }

    fn table_height_for(ui_height: usize) -> usize {
        ui_height.saturating_sub(STATIC_ROWS + TABLE_HEADER_HEIGHT)
    }

    // -------------------- Server requests ---------------------- //

    fn refresh(&mut self) -> Option<Command> {
        if self.in_flight.fetch {
            debug!("Fetch already running, skipping refresh");
            return None;
        }
        self.in_flight.fetch = true;
        self.set_status_message("Loading ...");
        Some(Command::FetchFiles)
    }

    fn files_loaded(&mut self, result: Result<Vec<RemoteFile>, String>) {
        self.in_flight.fetch = false;
        match result {
            Ok(remote) => {
                self.files = Self::unique_records(remote);
                self.fetch_error = None;
                info!("Loaded {} files", self.files.len());
                self.set_status_message(format!("Loaded {} files", self.files.len()));
                self.rebuild_rows(None);
            }
            Err(e) => {
                // Keep showing what we had, but make it visible that it is stale
                error!("Fetching the file list failed: {}", e);
                self.fetch_error = Some(e);
            }
        }
    }

    /// Converts the server list, a name seen more than once keeps its last entry.
    fn unique_records(remote: Vec<RemoteFile>) -> Vec<FileRecord> {
        let mut seen = HashSet::new();
        let mut records: Vec<FileRecord> = remote
            .into_iter()
            .rev()
            .filter(|file| {
                let first = seen.insert(file.name.clone());
                if !first {
                    warn!("Duplicate file name {}, keeping the last entry", file.name);
                }
                first
            })
            .map(FileRecord::from)
            .collect();
        records.reverse();
        records
    }

    fn upload(&mut self) -> Option<Command> {
        let (Some(file), Some(position)) =
            (self.pending.file.clone(), self.pending.position.clone())
        else {
            self.notify(Notification::warning(SELECT_FILE_WARNING));
            return None;
        };
        if !is_pdf(&file) {
            self.notify(Notification::warning(PDF_ONLY_WARNING));
            return None;
        }
        if self.in_flight.upload {
            self.notify(Notification::warning(UPLOAD_RUNNING_WARNING));
            return None;
        }

        self.in_flight.upload = true;
        self.set_status_message(format!("Uploading {} ...", file.display()));
        Some(Command::Upload { file, position })
    }

    fn upload_finished(&mut self, result: Result<(), String>) -> Option<Command> {
        self.in_flight.upload = false;
        match result {
            Ok(()) => {
                self.pending = PendingUpload::default();
                self.notify(Notification::info(UPLOAD_SUCCESS));
                self.refresh()
            }
            Err(e) => {
                error!("Upload failed: {}", e);
                self.notify(Notification::error(UPLOAD_FAILURE));
                None
            }
        }
    }

    fn details(&mut self) -> Option<Command> {
        let Some(name) = self.selected_name() else {
            self.set_status_message("No file selected");
            return None;
        };
        Some(Command::FileStats { name })
    }

    fn stats_loaded(&mut self, name: &str, result: Result<RemoteMetadata, String>) {
        match result {
            Ok(meta) => self.notify(Notification::info(format!(
                "{}\n\nPosition: {}\nUploaded: {}",
                name, meta.position, meta.upload_date
            ))),
            Err(e) => {
                error!("Loading details of {} failed: {}", name, e);
                self.notify(Notification::error(format!("Could not load details of {name}.")));
            }
        }
    }

    fn download(&mut self) -> Option<Command> {
        let Some(name) = self.selected_name() else {
            self.set_status_message("No file selected");
            return None;
        };
        self.set_status_message(format!("Downloading {name} ..."));
        Some(Command::Download { name })
    }

    fn download_finished(&mut self, name: &str, result: Result<PathBuf, String>) {
        match result {
            Ok(path) => self.notify(Notification::info(format!("Saved to {}", path.display()))),
            Err(e) => {
                error!("Download of {} failed: {}", name, e);
                self.notify(Notification::error(format!("Failed to download {name}.")));
            }
        }
    }

    fn copy_name(&self) -> Option<Command> {
        self.selected_name().map(Command::CopyToClipboard)
    }

    fn copy_finished(&mut self, result: Result<String, String>) {
        match result {
            Ok(text) => self.set_status_message(format!("Copied {text}")),
            Err(e) => {
                warn!("Clipboard failed: {}", e);
                self.notify(Notification::warning("Could not access the clipboard."));
            }
        }
    }

    // -------------------- Local state ---------------------- //

    fn pick_file(&mut self) {
        let current = self
            .pending
            .file
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        self.input.set(&current);
        self.last_input = self.input.get();
        self.modus = Modus::CMDINPUT;
    }

    fn raw_input(&mut self, key: KeyEvent) {
        self.last_input = self.input.read(key);
        if !self.last_input.finished {
            return;
        }
        if !self.last_input.canceled {
            let text = self.last_input.input.trim();
            self.pending.file = if text.is_empty() {
                None
            } else {
                Some(expand(text))
            };
            debug!("Selected upload file {:?}", self.pending.file);
        }
        self.input.clear();
        self.modus = if self.notification.is_some() {
            Modus::POPUP
        } else {
            Modus::TABLE
        };
    }

    fn cycle_position(&mut self) {
        self.pending.position = Position::cycle(self.pending.position.as_ref());
    }

    fn randomize_ranks<R: Rng>(&mut self, rng: &mut R) {
        for file in self.files.iter_mut() {
            file.rank = Rank::new(rng.gen_range(Rank::MIN..=Rank::MAX));
        }
        self.set_status_message(format!("Ranked {} files", self.files.len()));
        let keep = self.selected_name();
        self.rebuild_rows(keep);
    }

    fn sort_by(&mut self, key: SortKey) {
        self.sort = self.sort.toggle(key);
        debug!("Sorting by {:?}", self.sort);
        let keep = self.selected_name();
        self.rebuild_rows(keep);
    }

    fn filter_rank(&mut self, rank: Option<Rank>) {
        self.rank_filter = rank;
        let keep = self.selected_name();
        self.rebuild_rows(keep);
    }

    /// Recomputes the display order and moves the selection back onto `keep`
    /// if that file is still shown.
    fn rebuild_rows(&mut self, keep: Option<String>) {
        self.rows = displayed_indices(&self.files, self.sort, self.rank_filter);
        let row = keep.and_then(|name| {
            self.rows
                .iter()
                .position(|&idx| self.files[idx].name == name)
        });
        match row {
            Some(row) => {
                self.fit_offset();
                self.select_row(row);
            }
            None => self.clamp_selection(),
        }
    }

    // -------------------- Selection ---------------------- //

    fn selected_row(&self) -> usize {
        self.offset_row + self.cursor_row
    }

    fn select_row(&mut self, row: usize) {
        let height = self.table_height.max(1);
        if row < self.offset_row {
            self.offset_row = row;
        } else if row >= self.offset_row + height {
            self.offset_row = row + 1 - height;
        }
        self.cursor_row = row - self.offset_row;
    }

    fn clamp_selection(&mut self) {
        let last = self.rows.len().saturating_sub(1);
        let row = self.selected_row().min(last);
        self.fit_offset();
        self.offset_row = self.offset_row.min(row);
        self.select_row(row);
    }

    /// Scrolls back so the table has no empty space below the last row.
    fn fit_offset(&mut self) {
        let max_offset = self.rows.len().saturating_sub(self.table_height.max(1));
        self.offset_row = self.offset_row.min(max_offset);
    }

    fn move_selection_up(&mut self, size: usize) {
        let row = self.selected_row().saturating_sub(size);
        self.select_row(row);
    }

    fn move_selection_down(&mut self, size: usize) {
        let last = self.rows.len().saturating_sub(1);
        let row = (self.selected_row() + size).min(last);
        self.select_row(row);
    }

    // -------------------- Accessors for the ui ---------------------- //

    pub fn modus(&self) -> Modus {
        self.modus
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    /// Rows in display order.
    pub fn rows(&self) -> impl Iterator<Item = &FileRecord> {
        self.rows.iter().map(|&idx| &self.files[idx])
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows inside the table viewport.
    pub fn visible_rows(&self) -> impl Iterator<Item = &FileRecord> {
        self.rows().skip(self.offset_row).take(self.table_height)
    }

    pub fn selected(&self) -> Option<&FileRecord> {
        self.rows.get(self.selected_row()).map(|&idx| &self.files[idx])
    }

    fn selected_name(&self) -> Option<String> {
        self.selected().map(|r| r.name.clone())
    }

    /// Cursor position relative to the first visible row.
    pub fn cursor_row(&self) -> usize {
        self.cursor_row
    }

    pub fn sort(&self) -> SortConfig {
        self.sort
    }

    pub fn rank_filter(&self) -> Option<Rank> {
        self.rank_filter
    }

    pub fn pending(&self) -> &PendingUpload {
        &self.pending
    }

    pub fn in_flight(&self) -> InFlight {
        self.in_flight
    }

    pub fn fetch_error(&self) -> Option<&str> {
        self.fetch_error.as_deref()
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    pub fn help_text(&self) -> &'static str {
        HELP_TEXT
    }

    pub fn input(&self) -> &InputResult {
        &self.last_input
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn status_message_age(&self) -> std::time::Duration {
        self.last_status_message_update.elapsed()
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
