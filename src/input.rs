use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Navigation,
    TextEntry,
    ModalConfirm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    Up,
    Down,
    Left,
    Right,
    NextPage,
    PrevPage,
    Open,
    Back,
    ToggleSearch,
    ToggleMark,
    Command(char),
    InputChar(char),
    Backspace,
    SubmitInput,
    CancelInput,
    ConfirmYes,
    ConfirmNo,
    Accept,
    Dismiss,
    AnyKey,
}

pub fn map_key(mode: InputMode, key: KeyEvent) -> Option<Action> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Action::Quit);
    }

    match mode {
        InputMode::Navigation => map_navigation_key(key),
        InputMode::TextEntry => map_text_entry_key(key),
        InputMode::ModalConfirm => map_modal_key(key),
    }
}

fn map_navigation_key(key: KeyEvent) -> Option<Action> {
    let plain = key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT;
    match key.code {
        KeyCode::Char('q') if plain => Some(Action::Quit),
        KeyCode::Up => Some(Action::Up),
        KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') if plain => Some(Action::Up),
        KeyCode::Char('j') if plain => Some(Action::Down),
        KeyCode::Left => Some(Action::Left),
        KeyCode::Right => Some(Action::Right),
        KeyCode::Char('n') if plain => Some(Action::NextPage),
        KeyCode::Char('p') if plain => Some(Action::PrevPage),
        KeyCode::PageDown => Some(Action::NextPage),
        KeyCode::PageUp => Some(Action::PrevPage),
        KeyCode::Enter => Some(Action::Open),
        KeyCode::Esc => Some(Action::Back),
        KeyCode::Tab | KeyCode::Char('/') => Some(Action::ToggleSearch),
        KeyCode::Char(' ') => Some(Action::ToggleMark),
        KeyCode::Char(c) if plain && c.is_ascii_alphabetic() => Some(Action::Command(c)),
        _ => None,
    }
}

fn map_text_entry_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Enter => Some(Action::SubmitInput),
        KeyCode::Esc | KeyCode::Tab => Some(Action::CancelInput),
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::Char(c)
            if !key.modifiers.contains(KeyModifiers::CONTROL)
                && !key.modifiers.contains(KeyModifiers::ALT) =>
        {
            Some(Action::InputChar(c))
        }
        _ => None,
    }
}

fn map_modal_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => Some(Action::ConfirmYes),
        KeyCode::Char('n') | KeyCode::Char('N') => Some(Action::ConfirmNo),
        KeyCode::Up => Some(Action::Up),
        KeyCode::Down => Some(Action::Down),
        KeyCode::Left => Some(Action::Left),
        KeyCode::Right => Some(Action::Right),
        KeyCode::Enter => Some(Action::Accept),
        KeyCode::Esc => Some(Action::Dismiss),
        _ => Some(Action::AnyKey),
    }
}

/// Result of feeding one action to the text buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextEdit {
    Editing,
    Submit(String),
    Cancel,
}

/// Tracks which of the three input modes owns the keyboard.
///
/// Navigation and text entry toggle between each other; a modal covers
/// either one and hands the keyboard back to it when dismissed.
#[derive(Debug, Clone)]
pub struct InputRouter {
    mode: InputMode,
    covered: Option<InputMode>,
    buffer: String,
}

impl Default for InputRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl InputRouter {
    pub fn new() -> Self {
        Self {
            mode: InputMode::Navigation,
            covered: None,
            buffer: String::new(),
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn enter_text(&mut self, initial: &str) {
        if self.mode != InputMode::Navigation {
            return;
        }
        self.buffer = initial.to_string();
        self.mode = InputMode::TextEntry;
    }

    /// Tab: Navigation enters text entry seeded with `initial`, text entry
    /// goes back to Navigation and drops the buffer.
    pub fn toggle_text(&mut self, initial: &str) {
        match self.mode {
            InputMode::Navigation => self.enter_text(initial),
            InputMode::TextEntry => {
                self.leave_text();
            }
            InputMode::ModalConfirm => {}
        }
    }

    /// Leaves text entry without committing anything.
    pub fn leave_text(&mut self) -> String {
        if self.mode == InputMode::TextEntry {
            self.mode = InputMode::Navigation;
        }
        std::mem::take(&mut self.buffer)
    }

    pub fn edit(&mut self, action: &Action) -> TextEdit {
        if self.mode != InputMode::TextEntry {
            return TextEdit::Cancel;
        }
        match action {
            Action::InputChar(c) => {
                self.buffer.push(*c);
                TextEdit::Editing
            }
            Action::Backspace => {
                self.buffer.pop();
                TextEdit::Editing
            }
            Action::SubmitInput => TextEdit::Submit(self.leave_text()),
            Action::CancelInput => {
                self.leave_text();
                TextEdit::Cancel
            }
            _ => TextEdit::Editing,
        }
    }

    pub fn push_modal(&mut self) {
        if self.mode != InputMode::ModalConfirm {
            self.covered = Some(self.mode);
            self.mode = InputMode::ModalConfirm;
        }
    }

    pub fn pop_modal(&mut self) {
        if self.mode == InputMode::ModalConfirm {
            self.mode = self.covered.take().unwrap_or(InputMode::Navigation);
        }
    }
}
