use std::time::Duration;

use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
};

use crate::domain::{NoticeLevel, SortDirection, SortKey};
use crate::model::{Modus, Model};

// Title, upload line, filter line, table title and status line
pub const STATIC_ROWS: usize = 5;
pub const TABLE_HEADER_HEIGHT: usize = 1;

const STATUS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);
const HEADER_STYLE: Style = Style::new().fg(Color::White).bg(Color::Blue);

#[derive(Debug, Default)]
pub struct TableUI {
    server: String,
}

impl TableUI {
    pub fn new(server: &str) -> Self {
        Self {
            server: server.to_string(),
        }
    }

    pub fn draw(&self, model: &Model, frame: &mut Frame) {
        let [title, upload, filter, subheader, table, statusline] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(TABLE_HEADER_HEIGHT as u16),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        frame.render_widget(
            Paragraph::new(Line::from(" Resume Manager ".bold())).centered(),
            title,
        );
        frame.render_widget(Paragraph::new(Self::upload_line(model)), upload);
        frame.render_widget(Paragraph::new(Self::filter_line(model)), filter);
        frame.render_widget(Paragraph::new(Line::from(" Uploaded Files".bold())), subheader);
        self.draw_table(model, frame, table);
        self.draw_statusline(model, frame, statusline);

        match model.modus() {
            Modus::POPUP => {
                if let Some(notification) = model.notification() {
                    let (title, color) = match notification.level {
                        NoticeLevel::Info => (" Info ", Color::Green),
                        NoticeLevel::Warning => (" Warning ", Color::Yellow),
                        NoticeLevel::Error => (" Error ", Color::Red),
                    };
                    Self::draw_popup(frame, title, color, &notification.text, 60, 30);
                }
            }
            Modus::HELP => Self::draw_popup(frame, " Help ", Color::Blue, model.help_text(), 70, 80),
            Modus::TABLE | Modus::CMDINPUT => {}
        }
    }

    fn upload_line(model: &Model) -> Line<'static> {
        let pending = model.pending();
        let file = match &pending.file {
            Some(path) => path.display().to_string().yellow(),
            None => "no file selected".dark_gray(),
        };
        let position = match &pending.position {
            Some(position) => position.to_string().yellow(),
            None => "Select Position".dark_gray(),
        };
        Line::from(vec![
            " File ".into(),
            "<o>".blue().bold(),
            ": ".into(),
            file,
            "  Position ".into(),
            "<p>".blue().bold(),
            ": ".into(),
            position,
            "  Upload ".into(),
            "<u>".blue().bold(),
            "  Rank ".into(),
            "<R>".blue().bold(),
        ])
    }

    fn filter_line(model: &Model) -> Line<'static> {
        let filter = match model.rank_filter() {
            Some(rank) => format!("Rank {rank}").yellow(),
            None => "Show All".into(),
        };
        Line::from(vec![" Filter by Rank ".bold(), "<0-5>".blue().bold(), ": ".into(), filter])
    }

    fn draw_table(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let sort = model.sort();
        let header = SortKey::COLUMNS
            .iter()
            .map(|&key| {
                let marker = match (key == sort.key, sort.direction) {
                    (true, SortDirection::Ascending) => " ▲",
                    (true, SortDirection::Descending) => " ▼",
                    (false, _) => "",
                };
                Cell::from(format!("{}{}", key.title(), marker))
            })
            .collect::<Row>()
            .style(HEADER_STYLE.add_modifier(Modifier::BOLD))
            .height(TABLE_HEADER_HEIGHT as u16);

        let rows = model.visible_rows().map(|record| {
            Row::new(vec![
                Cell::from(record.name.clone()),
                Cell::from(record.submission_date.raw.clone()),
                Cell::from(record.position.to_string()),
                Cell::from(record.rank_label()),
            ])
        });

        let widths = [
            Constraint::Fill(3),
            Constraint::Length(20),
            Constraint::Length(16),
            Constraint::Length(10),
        ];
        let table = Table::new(rows, widths)
            .header(header)
            .row_highlight_style(Style::new().reversed());

        let mut state = TableState::default();
        if model.row_count() > 0 {
            state.select(Some(model.cursor_row()));
        }
        frame.render_stateful_widget(table, area, &mut state);
    }

    fn draw_statusline(&self, model: &Model, frame: &mut Frame, area: Rect) {
        if model.modus() == Modus::CMDINPUT {
            let input = model.input();
            let prompt = " PDF to upload: ";
            frame.render_widget(
                Paragraph::new(Line::from(vec![prompt.blue().bold(), input.input.clone().into()])),
                area,
            );
            let x = area.x + (prompt.chars().count() + input.cursor_pos) as u16;
            frame.set_cursor_position((x.min(area.right().saturating_sub(1)), area.y));
            return;
        }

        let mut spans: Vec<Span> = vec![
            format!(" {} ", self.server).dark_gray(),
            format!("{}/{} files ", model.row_count(), model.files().len()).into(),
        ];
        let in_flight = model.in_flight();
        if in_flight.fetch {
            spans.push("[loading] ".cyan());
        }
        if in_flight.upload {
            spans.push("[uploading] ".cyan());
        }
        if let Some(error) = model.fetch_error() {
            spans.push(format!("List outdated: {error} ").red().bold());
        } else if model.status_message_age() < STATUS_MESSAGE_TIMEOUT {
            spans.push(model.status_message().to_string().into());
        }
        spans.push(" <?> help".dark_gray());
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_popup(frame: &mut Frame, title: &str, color: Color, text: &str, width: u16, height: u16) {
        let area = Self::popup_area(frame.area(), width, height);
        let block = Block::bordered()
            .title(Line::from(title.to_string().bold()).centered())
            .title_bottom(Line::from(vec![" Close ".into(), "<Esc> ".blue().bold()]).centered())
            .border_set(border::THICK)
            .border_style(Style::new().fg(color));
        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(text.to_string())
                .block(block)
                .wrap(Wrap { trim: false }),
            area,
        );
    }

    fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
        let [area] = Layout::vertical([Constraint::Percentage(percent_y)])
            .flex(Flex::Center)
            .areas(area);
        let [area] = Layout::horizontal([Constraint::Percentage(percent_x)])
            .flex(Flex::Center)
            .areas(area);
        area
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Message, RemoteFile, RemoteMetadata};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use ratatui::{Terminal, backend::TestBackend};

    fn screen(model: &Model, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        let ui = TableUI::new("http://localhost:5000");
        terminal.draw(|frame| ui.draw(model, frame)).unwrap();
        let buffer = terminal.backend().buffer();
        (0..height)
            .map(|y| {
                (0..width)
                    .map(|x| buffer[(x, y)].symbol().to_string())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn loaded() -> Model {
        let files = vec![RemoteFile {
            name: "a.pdf".to_string(),
            metadata: RemoteMetadata {
                upload_date: "2024-01-01".to_string(),
                position: "Engineer".to_string(),
            },
        }];
        let mut rng = StdRng::seed_from_u64(1);
        Model::init(20).update(Message::FilesLoaded(Ok(files)), &mut rng).0
    }

    #[test]
    fn table_shows_headers_and_unranked_row() {
        let text = screen(&loaded(), 90, 20);
        assert!(text.contains("Name ▲"));
        assert!(text.contains("Submission Date"));
        assert!(text.contains("a.pdf"));
        assert!(text.contains("2024-01-01"));
        assert!(text.contains("Engineer"));
        assert!(text.contains("Unranked"));
        assert!(text.contains("1/1 files"));
        assert!(text.contains("Show All"));
    }

    #[test]
    fn fetch_error_is_shown_in_status_line() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = loaded()
            .update(Message::FilesLoaded(Err("timed out".to_string())), &mut rng)
            .0;
        let text = screen(&model, 90, 20);
        assert!(text.contains("List outdated: timed out"));
        assert!(text.contains("a.pdf"));
    }

    #[test]
    fn help_popup_lists_keys() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = loaded().update(Message::Help, &mut rng).0;
        let text = screen(&model, 90, 30);
        assert!(text.contains("Help"));
        assert!(text.contains("upload the selected file"));
    }
}
