use crate::error::{DashError, SourceError};
use crate::input::{Action, InputMode, InputRouter, TextEdit};
use crate::modal::{Modal, ModalOutcome};
use crate::model::ResourceKind;
use crate::screen::{Busy, Command, Composer, Outcome, Screen, Target, TextPurpose};
use crate::screens::menu::MenuScreen;
use crate::session::Session;
use crate::source::{ActionParams, DataSource, Verb};
use tokio::time::{Duration, Instant, timeout};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    None,
    Run(Command),
}

/// Screen stack, input routing and the modal layer.
///
/// The bottom of the stack is the main menu and is never popped.
pub struct App {
    running: bool,
    session: Session,
    stack: Vec<Box<dyn Screen>>,
    router: InputRouter,
    modal: Option<Modal>,
    text_purpose: Option<TextPurpose>,
    status: String,
}

impl App {
    pub fn new(session: Session) -> Self {
        let status = format!("Connected to {}", session.engine());
        Self {
            running: true,
            stack: vec![Box::new(MenuScreen::new(session.clone()))],
            session,
            router: InputRouter::new(),
            modal: None,
            text_purpose: None,
            status,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> InputMode {
        self.router.mode()
    }

    pub fn engine(&self) -> &str {
        self.session.engine()
    }

    pub fn input(&self) -> &str {
        self.router.buffer()
    }

    /// Prompt label while text entry is active.
    pub fn text_prompt(&self) -> Option<&'static str> {
        (self.router.mode() == InputMode::TextEntry)
            .then(|| self.text_purpose.map(TextPurpose::prompt))
            .flatten()
    }

    pub fn modal(&self) -> Option<&Modal> {
        self.modal.as_ref()
    }

    pub fn screen(&self) -> &dyn Screen {
        self.stack
            .last()
            .map(|screen| screen.as_ref())
            .unwrap_or_else(|| unreachable!("the menu screen is never popped"))
    }

    fn screen_mut(&mut self) -> &mut Box<dyn Screen> {
        self.stack
            .last_mut()
            .unwrap_or_else(|| unreachable!("the menu screen is never popped"))
    }

    pub fn breadcrumbs(&self) -> String {
        self.stack
            .iter()
            .map(|screen| screen.title())
            .collect::<Vec<_>>()
            .join(" > ")
    }

    pub fn help(&self) -> &'static str {
        self.screen().help()
    }

    /// The top screen's own status wins over the app-level message.
    pub fn status(&self) -> String {
        self.screen()
            .status()
            .unwrap_or_else(|| self.status.clone())
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn busy(&self, now: Instant) -> Option<Busy> {
        self.screen().busy(now)
    }

    pub fn compose(&self) -> Composer {
        let mut composer = Composer::new();
        self.screen().compose(&mut composer);
        composer
    }

    pub fn apply_action(&mut self, action: Action, now: Instant) -> AppCommand {
        if action == Action::Quit {
            self.running = false;
            self.status = "Exit requested".to_string();
            return AppCommand::None;
        }

        match self.router.mode() {
            InputMode::ModalConfirm => self.apply_modal_action(&action),
            InputMode::TextEntry => self.apply_text_action(&action),
            InputMode::Navigation => {
                if let Some(busy) = self.busy(now) {
                    debug!(label = %busy.label, "input dropped while busy");
                    return AppCommand::None;
                }
                if action == Action::ToggleSearch {
                    return self.begin_search();
                }
                let outcome = self.screen_mut().handle(&action);
                self.apply_outcome(outcome)
            }
        }
    }

    fn apply_modal_action(&mut self, action: &Action) -> AppCommand {
        let Some(modal) = self.modal.as_mut() else {
            self.router.pop_modal();
            return AppCommand::None;
        };
        match modal.handle(action) {
            ModalOutcome::Stay => AppCommand::None,
            ModalOutcome::Close => {
                self.close_modal();
                AppCommand::None
            }
            ModalOutcome::Replace(next) => {
                self.modal = Some(next);
                AppCommand::None
            }
            ModalOutcome::Run(command) => {
                self.close_modal();
                AppCommand::Run(command)
            }
        }
    }

    fn apply_text_action(&mut self, action: &Action) -> AppCommand {
        match self.router.edit(action) {
            TextEdit::Editing => AppCommand::None,
            TextEdit::Cancel => {
                self.text_purpose = None;
                self.status = "Input cancelled".to_string();
                AppCommand::None
            }
            TextEdit::Submit(text) => {
                let Some(purpose) = self.text_purpose.take() else {
                    return AppCommand::None;
                };
                let outcome = self.screen_mut().commit_text(purpose, &text);
                self.apply_outcome(outcome)
            }
        }
    }

    fn begin_search(&mut self) -> AppCommand {
        match self.screen().search_text() {
            Some(initial) => {
                self.router.toggle_text(&initial);
                self.text_purpose = Some(TextPurpose::Search);
            }
            None => self.status = "This screen has no search".to_string(),
        }
        AppCommand::None
    }

    fn apply_outcome(&mut self, outcome: Outcome) -> AppCommand {
        match outcome {
            Outcome::None => {}
            Outcome::Back => {
                if self.stack.len() > 1 {
                    self.stack.pop();
                }
            }
            Outcome::Open(screen) => {
                info!(screen = %screen.title(), "opening screen");
                self.stack.push(screen);
            }
            Outcome::Modal(modal) => self.open_modal(modal),
            Outcome::BeginText { purpose, initial } => {
                self.router.enter_text(&initial);
                self.text_purpose = Some(purpose);
            }
            Outcome::Run(command) => return AppCommand::Run(command),
            Outcome::Status(message) => self.status = message,
        }
        AppCommand::None
    }

    fn open_modal(&mut self, modal: Modal) {
        self.router.push_modal();
        self.modal = Some(modal);
    }

    fn close_modal(&mut self) {
        self.modal = None;
        self.router.pop_modal();
    }

    /// Runs a command against the data source and reports the result.
    pub async fn execute(&mut self, command: AppCommand) {
        let AppCommand::Run(command) = command else {
            return;
        };
        info!(command = %command.describe(), "executing");
        let source = self.session.source();
        let limit = self.session.settings().call_timeout;
        let failures = run_command(source.as_ref(), &command, limit).await;
        if failures.is_empty() {
            self.session.invalidate_after(&command);
            self.status = format!("{} requested", command.describe());
        } else {
            let message = failures
                .iter()
                .map(|failure| failure.error.to_string())
                .collect::<Vec<_>>()
                .join("\n");
            for failure in &failures {
                warn!(target_id = %failure.target_id, "{}", failure.error);
            }
            self.status = format!("{} failed", command.action());
            self.open_modal(Modal::notice(
                format!("{} failed", command.action()),
                message,
            ));
        }
        let failed = failures
            .into_iter()
            .map(|failure| failure.target_id)
            .collect::<Vec<_>>();
        self.screen_mut().after_command(&command, &failed);
    }

    /// Runs the command produced by a key, then lets the top screen poll.
    /// Does nothing once quit was requested.
    pub async fn settle(&mut self, command: AppCommand) {
        if !self.running {
            return;
        }
        self.execute(command).await;
        self.tick(Instant::now()).await;
    }

    /// Lets the top screen poll; screens below it are paused.
    pub async fn tick(&mut self, now: Instant) {
        self.screen_mut().tick(now).await;
    }
}

async fn call(
    source: &dyn DataSource,
    limit: Duration,
    kind: ResourceKind,
    id: &str,
    verb: Verb,
    params: ActionParams,
) -> Result<(), SourceError> {
    match timeout(limit, source.action(kind, id, verb, params)).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout(limit)),
    }
}

/// A call that failed, keyed by the id of its target.
#[derive(Debug)]
pub struct CallFailure {
    pub target_id: String,
    pub error: DashError,
}

/// Issues one call per target; returns every failure.
pub async fn run_command(
    source: &dyn DataSource,
    command: &Command,
    limit: Duration,
) -> Vec<CallFailure> {
    let failure = |target: &Target, source: SourceError| CallFailure {
        target_id: target.id.clone(),
        error: DashError::ActionFailure {
            action: command.action().to_string(),
            target: target.name.clone(),
            source,
        },
    };
    match command {
        Command::Power { verb, targets } => {
            let mut failures = Vec::new();
            for target in targets {
                debug!(vm = %target.name, verb = %verb, "power action");
                if let Err(error) = call(
                    source,
                    limit,
                    ResourceKind::Vm,
                    &target.id,
                    *verb,
                    ActionParams::default(),
                )
                .await
                {
                    failures.push(failure(target, error));
                }
            }
            failures
        }
        Command::Migrate { vm, host } => {
            let params = ActionParams {
                target_host_id: Some(host.id.clone()),
                ..ActionParams::default()
            };
            call(source, limit, ResourceKind::Vm, &vm.id, Verb::Migrate, params)
                .await
                .err()
                .map(|error| failure(vm, error))
                .into_iter()
                .collect()
        }
        Command::Provision { user_name, domain } => {
            let target = Target::new(user_name.as_str(), user_name.as_str());
            let params = ActionParams {
                user_name: Some(user_name.clone()),
                domain: Some(domain.clone()),
                ..ActionParams::default()
            };
            call(source, limit, ResourceKind::User, "", Verb::Provision, params)
                .await
                .err()
                .map(|error| failure(&target, error))
                .into_iter()
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{App, AppCommand};
    use crate::input::{Action, InputMode};
    use crate::modal::Modal;
    use crate::model::{Record, ResourceKind, VmStatus};
    use crate::screen::{Command, Target};
    use crate::screens::vm_detail::tests::vm;
    use crate::session::test_session;
    use crate::source::Verb;
    use crate::source::fake::FakeSource;
    use std::sync::Arc;
    use tokio::time::{Duration, Instant};

    fn source() -> Arc<FakeSource> {
        Arc::new(FakeSource::new().with(vec![
            Record::Vm(vm("vm-1", "web-01", VmStatus::Up)),
            Record::Vm(vm("vm-2", "db-01", VmStatus::Down)),
        ]))
    }

    async fn open_vms(app: &mut App) {
        let now = Instant::now();
        assert_eq!(app.apply_action(Action::Open, now), AppCommand::None);
        app.tick(now).await;
    }

    #[tokio::test]
    async fn quit_stops_the_app_from_any_mode() {
        let mut app = App::new(test_session(source()));
        open_vms(&mut app).await;
        app.apply_action(Action::ToggleSearch, Instant::now());
        assert_eq!(app.mode(), InputMode::TextEntry);
        app.apply_action(Action::Quit, Instant::now());
        assert!(!app.running());
    }

    #[tokio::test(start_paused = true)]
    async fn quit_skips_pending_work_against_a_hung_engine() {
        let source = source();
        let mut app = App::new(test_session(Arc::clone(&source)));
        open_vms(&mut app).await;
        source.stall_reads(Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(20)).await;

        let started = Instant::now();
        app.tick(started).await;
        assert!(started.elapsed() < Duration::from_secs(5));

        let command = app.apply_action(Action::Quit, Instant::now());
        let started = Instant::now();
        app.settle(command).await;
        assert!(!app.running());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn back_pops_screens_but_never_the_menu() {
        let mut app = App::new(test_session(source()));
        open_vms(&mut app).await;
        assert_eq!(app.breadcrumbs(), "Main menu > Virtual Machines");
        app.apply_action(Action::Back, Instant::now());
        app.apply_action(Action::Back, Instant::now());
        assert_eq!(app.breadcrumbs(), "Main menu");
    }

    #[tokio::test]
    async fn search_round_trip_through_text_entry() {
        let mut app = App::new(test_session(source()));
        open_vms(&mut app).await;
        let now = Instant::now();
        app.apply_action(Action::ToggleSearch, now);
        assert_eq!(app.text_prompt(), Some("Search"));
        for c in "db".chars() {
            app.apply_action(Action::InputChar(c), now);
        }
        app.apply_action(Action::SubmitInput, now);
        assert_eq!(app.mode(), InputMode::Navigation);
        assert_eq!(app.status(), "1 VMs");

        app.apply_action(Action::ToggleSearch, now);
        assert_eq!(app.input(), "db");
        for _ in 0..2 {
            app.apply_action(Action::Backspace, now);
        }
        for c in "zzz".chars() {
            app.apply_action(Action::InputChar(c), now);
        }
        app.apply_action(Action::SubmitInput, now);
        assert_eq!(app.mode(), InputMode::ModalConfirm);
        assert!(matches!(app.modal(), Some(Modal::Notice { .. })));
        app.apply_action(Action::AnyKey, now);
        assert_eq!(app.mode(), InputMode::Navigation);
    }

    #[tokio::test]
    async fn confirmed_stop_runs_and_failures_open_a_notice() {
        let source = source();
        let mut app = App::new(test_session(Arc::clone(&source)));
        open_vms(&mut app).await;
        let now = Instant::now();
        app.apply_action(Action::Down, now);
        assert_eq!(app.apply_action(Action::Command('d'), now), AppCommand::None);
        assert_eq!(app.mode(), InputMode::ModalConfirm);

        assert_eq!(app.apply_action(Action::Accept, now), AppCommand::None);
        assert!(app.modal().is_none());

        app.apply_action(Action::Command('d'), now);
        let command = app.apply_action(Action::ConfirmYes, now);
        let expected = Command::Power {
            verb: Verb::Stop,
            targets: vec![Target::new("vm-1", "web-01")],
        };
        assert_eq!(command, AppCommand::Run(expected.clone()));

        source.fail_actions("VM is locked");
        app.execute(command).await;
        let Some(Modal::Notice { title, message }) = app.modal() else {
            panic!("failure opens a notice");
        };
        assert_eq!(title, "Stop failed");
        assert!(message.contains("web-01"));
        assert!(message.contains("VM is locked"));

        let actions = source.actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].0, ResourceKind::Vm);
        assert_eq!(actions[0].2, Verb::Stop);
    }

    #[tokio::test]
    async fn migrate_sends_the_target_host() {
        let source = source();
        let mut app = App::new(test_session(Arc::clone(&source)));
        app.execute(AppCommand::Run(Command::Migrate {
            vm: Target::new("vm-1", "web-01"),
            host: Target::new("h2", "host-b"),
        }))
        .await;
        assert!(app.modal().is_none());
        assert_eq!(app.status(), "Migrate web-01 to host-b requested");
        assert_eq!(source.actions()[0].3.target_host_id.as_deref(), Some("h2"));
    }
}
