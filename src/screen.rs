use crate::input::Action;
use crate::modal::Modal;
use crate::source::Verb;
use crate::table::{TableLines, draw_lines};
use async_trait::async_trait;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use tokio::time::Instant;

const HEADING: Color = Color::Rgb(52, 211, 153);
const TEXT: Color = Color::Rgb(203, 213, 225);

/// Identity and display name of an entity a command acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub name: String,
}

impl Target {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A domain action the app executes against the data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Power { verb: Verb, targets: Vec<Target> },
    Migrate { vm: Target, host: Target },
    Provision { user_name: String, domain: String },
}

impl Command {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Power { verb, .. } => verb.title(),
            Self::Migrate { .. } => Verb::Migrate.title(),
            Self::Provision { .. } => Verb::Provision.title(),
        }
    }

    pub fn target_label(&self) -> String {
        match self {
            Self::Power { targets, .. } => targets
                .iter()
                .map(|target| target.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            Self::Migrate { vm, .. } => vm.name.clone(),
            Self::Provision { user_name, domain } => format!("{user_name}@{domain}"),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Migrate { vm, host } => format!("Migrate {} to {}", vm.name, host.name),
            _ => format!("{} {}", self.action(), self.target_label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextPurpose {
    Search,
    NewUser,
}

impl TextPurpose {
    pub fn prompt(self) -> &'static str {
        match self {
            Self::Search => "Search",
            Self::NewUser => "New user name",
        }
    }
}

/// What a screen asks the app to do after handling a key.
pub enum Outcome {
    None,
    Back,
    Open(Box<dyn Screen>),
    Modal(Modal),
    BeginText { purpose: TextPurpose, initial: String },
    Run(Command),
    Status(String),
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Back => f.write_str("Back"),
            Self::Open(screen) => write!(f, "Open({})", screen.title()),
            Self::Modal(modal) => write!(f, "Modal({})", modal.title()),
            Self::BeginText { purpose, initial } => {
                write!(f, "BeginText({purpose:?}, {initial:?})")
            }
            Self::Run(command) => write!(f, "Run({command:?})"),
            Self::Status(message) => write!(f, "Status({message:?})"),
        }
    }
}

/// A slow fetch in progress, shown as a popup over the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Busy {
    pub label: String,
    pub glyph: char,
}

#[async_trait]
pub trait Screen: Send {
    fn title(&self) -> String;

    /// Key hints for the footer.
    fn help(&self) -> &'static str;

    fn compose(&self, composer: &mut Composer);

    fn handle(&mut self, action: &Action) -> Outcome;

    /// Runs due polls and collects finished background work.
    async fn tick(&mut self, now: Instant);

    fn busy(&self, _now: Instant) -> Option<Busy> {
        None
    }

    /// Current committed search text; `None` when the screen has no search.
    fn search_text(&self) -> Option<String> {
        None
    }

    fn commit_text(&mut self, _purpose: TextPurpose, _text: &str) -> Outcome {
        Outcome::None
    }

    /// Called after a command ran; `failed` holds the ids of targets whose call failed.
    fn after_command(&mut self, _command: &Command, _failed: &[String]) {}

    fn status(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
enum Section {
    Lines(Vec<Line<'static>>),
    Table(TableLines),
}

impl Section {
    fn height(&self) -> usize {
        match self {
            Self::Lines(lines) => lines.len(),
            Self::Table(table) => table.height(),
        }
    }
}

/// Stacks headings, tables and text vertically for one frame.
///
/// Every section starts right below the previous one, using the height it
/// actually rendered to.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    sections: Vec<Section>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn heading(&mut self, text: impl Into<String>) {
        let line = Line::styled(
            text.into(),
            Style::default().fg(HEADING).add_modifier(Modifier::BOLD),
        );
        self.sections.push(Section::Lines(vec![line]));
    }

    pub fn text(&mut self, text: impl Into<String>) {
        self.line(Line::styled(text.into(), Style::default().fg(TEXT)));
    }

    pub fn line(&mut self, line: Line<'static>) {
        match self.sections.last_mut() {
            Some(Section::Lines(lines)) => lines.push(line),
            _ => self.sections.push(Section::Lines(vec![line])),
        }
    }

    pub fn table(&mut self, table: TableLines) {
        self.sections.push(Section::Table(table));
    }

    pub fn gap(&mut self) {
        self.sections.push(Section::Lines(vec![Line::default()]));
    }

    pub fn height(&self) -> usize {
        self.sections.iter().map(Section::height).sum()
    }

    /// Top row of each section relative to the composer origin.
    pub fn offsets(&self) -> Vec<usize> {
        self.sections
            .iter()
            .scan(0usize, |top, section| {
                let current = *top;
                *top += section.height();
                Some(current)
            })
            .collect()
    }

    pub fn draw(&self, buf: &mut Buffer, area: Rect) {
        for (section, offset) in self.sections.iter().zip(self.offsets()) {
            let Ok(offset) = u16::try_from(offset) else {
                break;
            };
            let Some(y) = area.y.checked_add(offset) else {
                break;
            };
            if y >= area.bottom() {
                break;
            }
            let lines = match section {
                Section::Lines(lines) => lines.as_slice(),
                Section::Table(table) => table.lines(),
            };
            draw_lines(buf, area, area.x, y, lines);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Command, Composer, Target};
    use crate::source::Verb;
    use crate::table::{ColumnSpec, render_table};
    use ratatui::buffer::Buffer;
    use ratatui::layout::Rect;

    const COLUMNS: &[ColumnSpec] = &[ColumnSpec::new("Name", 6)];

    fn row_text(buf: &Buffer, y: u16) -> String {
        (0..buf.area.width)
            .map(|x| buf[(x, y)].symbol().to_string())
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    #[test]
    fn offsets_follow_rendered_heights() {
        let rows = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut composer = Composer::new();
        composer.heading("Clusters");
        composer.table(render_table(COLUMNS, &rows, |row| vec![row.clone()], None));
        composer.gap();
        composer.heading("Hosts");
        composer.table(render_table::<String>(COLUMNS, &[], |row| vec![row.clone()], None));

        assert_eq!(composer.offsets(), vec![0, 1, 8, 9, 10]);
        assert_eq!(composer.height(), 15);
    }

    #[test]
    fn draw_places_second_table_below_the_first() {
        let mut composer = Composer::new();
        composer.heading("VMs");
        let rows = vec!["web".to_string()];
        composer.table(render_table(COLUMNS, &rows, |row| vec![row.clone()], None));
        composer.heading("Hosts");

        let area = Rect::new(0, 0, 20, 12);
        let mut buf = Buffer::empty(area);
        composer.draw(&mut buf, area);
        assert_eq!(row_text(&buf, 0), "VMs");
        assert_eq!(row_text(&buf, 4), "│ web    │");
        assert_eq!(row_text(&buf, 6), "Hosts");
    }

    #[test]
    fn draw_stops_at_the_bottom_of_the_area() {
        let mut composer = Composer::new();
        for index in 0..10 {
            composer.text(format!("line {index}"));
        }
        let area = Rect::new(0, 0, 10, 3);
        let mut buf = Buffer::empty(area);
        composer.draw(&mut buf, area);
        assert_eq!(row_text(&buf, 2), "line 2");
    }

    #[test]
    fn commands_describe_action_and_targets() {
        let command = Command::Power {
            verb: Verb::Reboot,
            targets: vec![Target::new("1", "web-01"), Target::new("2", "web-02")],
        };
        assert_eq!(command.describe(), "Restart web-01, web-02");

        let command = Command::Migrate {
            vm: Target::new("1", "db"),
            host: Target::new("h2", "host-b"),
        };
        assert_eq!(command.describe(), "Migrate db to host-b");
        assert_eq!(command.target_label(), "db");
    }
}
