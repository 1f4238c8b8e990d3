use crate::input::Action;
use crate::paging::Pager;
use crate::screen::{Command, Target};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

const SELECTED: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirm {
    pub title: String,
    pub prompt: String,
    /// Starts on "No"; Enter runs the command only when "Yes" is highlighted.
    pub yes_selected: bool,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickPurpose {
    MigrateVm { vm: Target },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picker {
    pub title: String,
    pub choices: Vec<Target>,
    pub pager: Pager,
    pub purpose: PickPurpose,
}

impl Picker {
    pub fn selected(&self) -> Option<&Target> {
        self.pager
            .selected_index()
            .and_then(|index| self.choices.get(index))
    }
}

/// A popup that owns the keyboard until dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modal {
    Confirm(Confirm),
    Notice { title: String, message: String },
    Picker(Picker),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModalOutcome {
    Stay,
    Close,
    Replace(Modal),
    Run(Command),
}

impl Modal {
    pub fn confirm(command: Command) -> Self {
        Self::Confirm(Confirm {
            title: format!("{} {}", command.action(), command.target_label()),
            prompt: format!("{}?", command.describe()),
            yes_selected: false,
            command,
        })
    }

    pub fn notice(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Notice {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn migrate_picker(vm: Target, hosts: Vec<Target>) -> Self {
        let mut pager = Pager::wraparound();
        pager.set_len(hosts.len());
        Self::Picker(Picker {
            title: format!("Select target host for {}", vm.name),
            choices: hosts,
            pager,
            purpose: PickPurpose::MigrateVm { vm },
        })
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Confirm(confirm) => &confirm.title,
            Self::Notice { title, .. } => title,
            Self::Picker(picker) => &picker.title,
        }
    }

    pub fn handle(&mut self, action: &Action) -> ModalOutcome {
        match self {
            Self::Notice { .. } => ModalOutcome::Close,
            Self::Confirm(confirm) => match action {
                Action::ConfirmYes => ModalOutcome::Run(confirm.command.clone()),
                Action::ConfirmNo | Action::Dismiss => ModalOutcome::Close,
                Action::Left | Action::Right | Action::Up | Action::Down => {
                    confirm.yes_selected = !confirm.yes_selected;
                    ModalOutcome::Stay
                }
                Action::Accept if confirm.yes_selected => {
                    ModalOutcome::Run(confirm.command.clone())
                }
                Action::Accept => ModalOutcome::Close,
                _ => ModalOutcome::Stay,
            },
            Self::Picker(picker) => match action {
                Action::Up => {
                    picker.pager.move_cursor(-1);
                    ModalOutcome::Stay
                }
                Action::Down => {
                    picker.pager.move_cursor(1);
                    ModalOutcome::Stay
                }
                Action::Accept => match (picker.selected(), &picker.purpose) {
                    (Some(host), PickPurpose::MigrateVm { vm }) => {
                        ModalOutcome::Replace(Modal::confirm(Command::Migrate {
                            vm: vm.clone(),
                            host: host.clone(),
                        }))
                    }
                    (None, _) => ModalOutcome::Close,
                },
                Action::Dismiss | Action::ConfirmNo => ModalOutcome::Close,
                _ => ModalOutcome::Stay,
            },
        }
    }

    pub fn body(&self) -> Vec<Line<'static>> {
        match self {
            Self::Confirm(confirm) => {
                let option = |label: &'static str, active: bool| {
                    if active {
                        Span::styled(
                            format!("[ {label} ]"),
                            Style::default()
                                .fg(Color::Black)
                                .bg(SELECTED)
                                .add_modifier(Modifier::BOLD),
                        )
                    } else {
                        Span::styled(format!("  {label}  "), Style::default().fg(MUTED))
                    }
                };
                vec![
                    Line::from(confirm.prompt.clone()),
                    Line::default(),
                    Line::from(vec![
                        option("Yes", confirm.yes_selected),
                        Span::raw("   "),
                        option("No", !confirm.yes_selected),
                    ]),
                    Line::default(),
                    Line::styled(
                        "y/n or arrows + Enter, Esc cancels",
                        Style::default().fg(MUTED),
                    ),
                ]
            }
            Self::Notice { message, .. } => {
                let mut lines = message
                    .lines()
                    .map(|line| Line::from(line.to_string()))
                    .collect::<Vec<_>>();
                lines.push(Line::default());
                lines.push(Line::styled(
                    "Press any key to close.",
                    Style::default().fg(MUTED),
                ));
                lines
            }
            Self::Picker(picker) => {
                let mut lines = Vec::with_capacity(picker.choices.len() + 2);
                let cursor = picker.pager.selected_index();
                for (index, choice) in picker.choices.iter().enumerate() {
                    if cursor == Some(index) {
                        lines.push(Line::styled(
                            format!("> {}", choice.name),
                            Style::default().fg(Color::Black).bg(Color::Cyan),
                        ));
                    } else {
                        lines.push(Line::from(format!("  {}", choice.name)));
                    }
                }
                lines.push(Line::default());
                lines.push(Line::styled(
                    "Up/Down: navigate | Enter: select | Esc: cancel",
                    Style::default().fg(MUTED),
                ));
                lines
            }
        }
    }
}
