use crate::error::{DashError, SourceError};
use crate::filter::Searchable;
use crate::format::opt;
use crate::input::Action;
use crate::modal::Modal;
use crate::model::User;
use crate::paging::Pager;
use crate::screen::{Busy, Command, Composer, Outcome, Screen, TextPurpose};
use crate::screens::{FilteredList, filter_outcome, filtered_title};
use crate::session::{ALL_USERS, Session};
use crate::source::{DataSource, list_typed};
use crate::table::{ColumnSpec, render_table};
use crate::worker::{BusyTask, poll_slot};
use async_trait::async_trait;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Authorization domain new users are provisioned into.
pub const INTERNAL_DOMAIN: &str = "internal-authz";

const PAGE_SIZE: usize = 20;

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("User Name", 24),
    ColumnSpec::new("Name", 20),
    ColumnSpec::new("Domain", 16),
    ColumnSpec::new("Email", 26),
    ColumnSpec::new("Department", 16),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOrigin {
    Internal,
    Directory,
}

impl UserOrigin {
    pub const ALL: [Self; 2] = [Self::Internal, Self::Directory];
}

impl Display for UserOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Internal => "internal",
            Self::Directory => "directory",
        })
    }
}

impl Searchable for User {
    type Category = UserOrigin;

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.user_name.as_str(), self.name.as_str()];
        fields.extend(self.email.as_deref());
        fields.extend(self.department.as_deref());
        fields
    }

    fn in_category(&self, category: UserOrigin) -> bool {
        match category {
            UserOrigin::Internal => self.is_internal(),
            UserOrigin::Directory => !self.is_internal(),
        }
    }
}

pub async fn fetch_users(source: &dyn DataSource) -> Result<Vec<User>, SourceError> {
    let mut users = list_typed::<User>(source, None).await?;
    users.sort_by(|left, right| left.user_name.cmp(&right.user_name));
    Ok(users)
}

fn user_id(user: &User) -> &str {
    &user.id
}

pub struct UsersScreen {
    session: Session,
    users: Vec<User>,
    table: FilteredList<User>,
    task: Option<BusyTask<Vec<User>>>,
    loaded: bool,
    status: Option<String>,
}

impl UsersScreen {
    pub fn new(session: Session) -> Self {
        let mut screen = Self {
            session,
            users: Vec::new(),
            table: FilteredList::new(Pager::paged(PAGE_SIZE), user_id),
            task: None,
            loaded: false,
            status: None,
        };
        match screen.session.caches().users.get(&ALL_USERS.to_string()) {
            Some(cached) => screen.install(cached.as_ref().clone()),
            None => screen.load(),
        }
        screen
    }

    fn load(&mut self) {
        let source = self.session.source();
        self.task = Some(BusyTask::spawn("Loading users", async move {
            fetch_users(source.as_ref()).await
        }));
    }

    fn install(&mut self, users: Vec<User>) {
        self.users = users;
        self.loaded = true;
        self.table.refresh(&self.users);
    }

    fn provision(&self, text: &str) -> Outcome {
        let user_name = text.trim();
        if user_name.is_empty() {
            return Outcome::Status("User name is empty; nothing added".to_string());
        }
        if self.users.iter().any(|user| {
            user.user_name == user_name || user.user_name == format!("{user_name}@internal")
        }) {
            return Outcome::Modal(Modal::notice(
                "Add user",
                format!("User {user_name} already exists"),
            ));
        }
        Outcome::Modal(Modal::confirm(Command::Provision {
            user_name: user_name.to_string(),
            domain: INTERNAL_DOMAIN.to_string(),
        }))
    }
}

#[async_trait]
impl Screen for UsersScreen {
    fn title(&self) -> String {
        "Users".to_string()
    }

    fn help(&self) -> &'static str {
        "Up/Down: move | n/p: page | a: add user | c: origin | r: reload | Tab: search | Esc: back"
    }

    fn compose(&self, composer: &mut Composer) {
        composer.heading(filtered_title(
            "- Users",
            self.table.pager().len(),
            self.users.len(),
            self.table.committed(),
            self.table.pager(),
        ));
        let visible = self.table.visible(&self.users);
        composer.table(render_table(
            COLUMNS,
            &visible,
            |user| {
                vec![
                    user.user_name.clone(),
                    user.name.clone(),
                    opt(user.domain.as_deref()),
                    opt(user.email.as_deref()),
                    opt(user.department.as_deref()),
                ]
            },
            self.table.highlight(),
        ));
        if !self.loaded && self.task.is_none() {
            composer.text("User directory unavailable; press r to retry.");
        }
    }

    fn handle(&mut self, action: &Action) -> Outcome {
        match action {
            Action::Back => Outcome::Back,
            Action::Command('a') => Outcome::BeginText {
                purpose: TextPurpose::NewUser,
                initial: String::new(),
            },
            Action::Command('c') => {
                filter_outcome(self.table.cycle_category(&UserOrigin::ALL, &self.users), "users")
            }
            Action::Command('r') => {
                if self.task.is_none() {
                    self.session.caches().users.invalidate(&ALL_USERS.to_string());
                    self.load();
                }
                Outcome::None
            }
            other => {
                self.table.navigate(other);
                Outcome::None
            }
        }
    }

    async fn tick(&mut self, _now: Instant) {
        match poll_slot(&mut self.task) {
            Some(Ok(users)) => {
                info!(count = users.len(), "user directory loaded");
                self.session
                    .caches()
                    .users
                    .put(ALL_USERS.to_string(), Arc::new(users.clone()));
                self.install(users);
                self.status = None;
            }
            Some(Err(source)) => {
                let error = DashError::TransientFetch {
                    class: "user directory",
                    source,
                };
                warn!("{error}");
                self.status = Some(error.to_string());
            }
            None => {}
        }
    }

    fn busy(&self, now: Instant) -> Option<Busy> {
        self.task.as_ref().map(|task| Busy {
            label: task.label().to_string(),
            glyph: task.spinner(now),
        })
    }

    fn search_text(&self) -> Option<String> {
        Some(self.table.committed().text.clone())
    }

    fn commit_text(&mut self, purpose: TextPurpose, text: &str) -> Outcome {
        match purpose {
            TextPurpose::Search => filter_outcome(self.table.search(&self.users, text), "users"),
            TextPurpose::NewUser => self.provision(text),
        }
    }

    fn after_command(&mut self, command: &Command, failed: &[String]) {
        if failed.is_empty() && matches!(command, Command::Provision { .. }) && self.task.is_none() {
            self.load();
        }
    }

    fn status(&self) -> Option<String> {
        self.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::{INTERNAL_DOMAIN, UserOrigin, UsersScreen};
    use crate::filter::Searchable;
    use crate::input::Action;
    use crate::modal::Modal;
    use crate::model::{Record, ResourceKind, User};
    use crate::screen::{Command, Outcome, Screen, TextPurpose};
    use crate::session::{ALL_USERS, test_session};
    use crate::source::fake::FakeSource;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn user(id: &str, user_name: &str, domain: &str) -> User {
        User {
            id: id.to_string(),
            name: user_name.split('@').next().unwrap_or_default().to_string(),
            user_name: user_name.to_string(),
            principal: None,
            domain: Some(domain.to_string()),
            email: None,
            department: None,
        }
    }

    async fn settle(screen: &mut UsersScreen) {
        for _ in 0..50 {
            tokio::task::yield_now().await;
            screen.tick(Instant::now()).await;
            if screen.busy(Instant::now()).is_none() {
                return;
            }
        }
        panic!("users never finished loading");
    }

    fn source() -> Arc<FakeSource> {
        Arc::new(FakeSource::new().with(vec![
            Record::User(user("u1", "admin@internal", "internal-authz")),
            Record::User(user("u2", "jdoe@corp.example", "corp.example")),
        ]))
    }

    #[test]
    fn origin_splits_internal_and_directory_users() {
        let admin = user("u1", "admin@internal", "internal-authz");
        assert!(admin.in_category(UserOrigin::Internal));
        let jdoe = user("u2", "jdoe@corp.example", "corp.example");
        assert!(jdoe.in_category(UserOrigin::Directory));
    }

    #[tokio::test]
    async fn directory_is_loaded_once_and_cached() {
        let source = source();
        let session = test_session(Arc::clone(&source));
        let mut screen = UsersScreen::new(session.clone());
        settle(&mut screen).await;
        assert_eq!(screen.users.len(), 2);
        let calls = source.list_calls();

        let second = UsersScreen::new(session.clone());
        assert!(second.busy(Instant::now()).is_none());
        assert_eq!(second.users.len(), 2);
        assert_eq!(source.list_calls(), calls);
        assert!(session.caches().users.get(&ALL_USERS.to_string()).is_some());
    }

    #[tokio::test]
    async fn failed_directory_load_is_retried_with_the_reload_key() {
        let source = source();
        source.fail_lists(ResourceKind::User, 1);
        let mut screen = UsersScreen::new(test_session(Arc::clone(&source)));
        settle(&mut screen).await;
        assert!(screen.users.is_empty());
        assert!(screen.status().is_some());
        assert!(screen.help().contains("r: reload"));

        screen.handle(&Action::Command('r'));
        settle(&mut screen).await;
        assert_eq!(screen.users.len(), 2);
        assert!(screen.status().is_none());
    }

    #[tokio::test]
    async fn adding_a_user_goes_through_text_entry_and_confirmation() {
        let source = source();
        let mut screen = UsersScreen::new(test_session(Arc::clone(&source)));
        settle(&mut screen).await;

        assert!(matches!(
            screen.handle(&Action::Command('a')),
            Outcome::BeginText {
                purpose: TextPurpose::NewUser,
                ..
            }
        ));
        let Outcome::Modal(Modal::Confirm(confirm)) =
            screen.commit_text(TextPurpose::NewUser, " alice ")
        else {
            panic!("a new user name asks for confirmation");
        };
        assert_eq!(
            confirm.command,
            Command::Provision {
                user_name: "alice".to_string(),
                domain: INTERNAL_DOMAIN.to_string(),
            }
        );
        assert!(matches!(
            screen.commit_text(TextPurpose::NewUser, "admin"),
            Outcome::Modal(Modal::Notice { .. })
        ));

        source.set(vec![Record::User(user("u3", "alice@internal", "internal-authz"))]);
        screen.after_command(&confirm.command, &[]);
        settle(&mut screen).await;
        assert_eq!(screen.users[0].user_name, "alice@internal");
    }
}
