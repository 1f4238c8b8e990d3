use crate::input::Action;
use crate::paging::Pager;
use crate::screen::{Composer, Outcome, Screen};
use crate::screens::clusters::ClustersScreen;
use crate::screens::data_centers::DataCentersScreen;
use crate::screens::disks::DisksScreen;
use crate::screens::events::{EventScope, EventsScreen};
use crate::screens::hosts::HostsScreen;
use crate::screens::networks::NetworksScreen;
use crate::screens::storage_domains::StorageDomainsScreen;
use crate::screens::users::UsersScreen;
use crate::screens::vms::VmsScreen;
use crate::session::Session;
use async_trait::async_trait;
use ratatui::style::{Color, Style};
use ratatui::text::Line;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuEntry {
    Vms,
    DataCenters,
    Clusters,
    Hosts,
    Networks,
    StorageDomains,
    Disks,
    Users,
    Events,
}

impl MenuEntry {
    pub const ALL: [Self; 9] = [
        Self::Vms,
        Self::DataCenters,
        Self::Clusters,
        Self::Hosts,
        Self::Networks,
        Self::StorageDomains,
        Self::Disks,
        Self::Users,
        Self::Events,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Vms => "Virtual Machines",
            Self::DataCenters => "Data Centers",
            Self::Clusters => "Clusters",
            Self::Hosts => "Hosts",
            Self::Networks => "Networks",
            Self::StorageDomains => "Storage Domains",
            Self::Disks => "Storage Disks",
            Self::Users => "Users",
            Self::Events => "Events",
        }
    }

    fn open(self, session: &Session) -> Box<dyn Screen> {
        let session = session.clone();
        match self {
            Self::Vms => Box::new(VmsScreen::new(session)),
            Self::DataCenters => Box::new(DataCentersScreen::new(session)),
            Self::Clusters => Box::new(ClustersScreen::new(session)),
            Self::Hosts => Box::new(HostsScreen::new(session)),
            Self::Networks => Box::new(NetworksScreen::new(session)),
            Self::StorageDomains => Box::new(StorageDomainsScreen::new(session)),
            Self::Disks => Box::new(DisksScreen::new(session)),
            Self::Users => Box::new(UsersScreen::new(session)),
            Self::Events => Box::new(EventsScreen::new(session, EventScope::All)),
        }
    }
}

/// Root screen; never popped.
pub struct MenuScreen {
    session: Session,
    pager: Pager,
}

impl MenuScreen {
    pub fn new(session: Session) -> Self {
        let mut pager = Pager::wraparound();
        pager.set_len(MenuEntry::ALL.len());
        Self { session, pager }
    }

    pub fn selected(&self) -> Option<MenuEntry> {
        self.pager
            .selected_index()
            .and_then(|index| MenuEntry::ALL.get(index).copied())
    }
}

#[async_trait]
impl Screen for MenuScreen {
    fn title(&self) -> String {
        "Main menu".to_string()
    }

    fn help(&self) -> &'static str {
        "Up/Down: move | Enter: open | q: quit"
    }

    fn compose(&self, composer: &mut Composer) {
        composer.heading(format!("rutil: {}", self.session.engine()));
        composer.gap();
        let cursor = self.pager.selected_index();
        for (index, entry) in MenuEntry::ALL.iter().enumerate() {
            if cursor == Some(index) {
                composer.line(Line::styled(
                    format!("> {}", entry.label()),
                    Style::default().fg(Color::Black).bg(Color::Cyan),
                ));
            } else {
                composer.line(Line::from(format!("  {}", entry.label())));
            }
        }
    }

    fn handle(&mut self, action: &Action) -> Outcome {
        match action {
            Action::Up => {
                self.pager.move_cursor(-1);
                Outcome::None
            }
            Action::Down => {
                self.pager.move_cursor(1);
                Outcome::None
            }
            Action::Open => match self.selected() {
                Some(entry) => Outcome::Open(entry.open(&self.session)),
                None => Outcome::None,
            },
            _ => Outcome::None,
        }
    }

    async fn tick(&mut self, _now: Instant) {}
}
