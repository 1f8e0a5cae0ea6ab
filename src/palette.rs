use std::rc::Rc;

use crossterm::event::{Event, KeyEvent, KeyEventKind, MouseEvent};
use ratatui::layout::Rect;

use crate::container::{CommandContainer, ContainerAction};
use crate::hotkey::Hotkey;
use crate::model::CommandItem;
use crate::outside::OutsideClick;
use crate::scroll_lock::{ScrollLock, ScrollLockGuard};

#[derive(Debug, Clone, Copy)]
pub struct PaletteSettings {
    pub hotkey: Hotkey,
    pub close_on_accept: bool,
}

impl Default for PaletteSettings {
    fn default() -> Self {
        Self {
            hotkey: Hotkey::default(),
            close_on_accept: true,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PaletteOutcome {
    /// Not for the palette; the host should handle it.
    Ignored,
    Handled,
    Opened,
    Closed,
    Accepted(CommandItem),
}

// Everything that exists only while the overlay is shown. Dropping it releases
// the scroll lock and the outside-click listener together.
struct OpenSession {
    container: CommandContainer,
    outside: OutsideClick,
    _scroll: ScrollLockGuard,
}

pub struct Palette {
    items: Rc<[CommandItem]>,
    settings: PaletteSettings,
    scroll_lock: ScrollLock,
    session: Option<OpenSession>,
}

impl Palette {
    pub fn new(items: Vec<CommandItem>, settings: PaletteSettings, scroll_lock: ScrollLock) -> Self {
        Self {
            items: Rc::from(items),
            settings,
            scroll_lock,
            session: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.session.is_some()
    }

    pub fn hotkey(&self) -> Hotkey {
        self.settings.hotkey
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn container(&self) -> Option<&CommandContainer> {
        self.session.as_ref().map(|session| &session.container)
    }

    /// Records where the overlay was drawn so pointer presses can be classified.
    pub fn set_region(&mut self, region: Rect) {
        if let Some(session) = &mut self.session {
            session.outside.set_region(region);
        }
    }

    pub fn set_settings(&mut self, settings: PaletteSettings) {
        self.settings = settings;
    }

    pub fn set_items(&mut self, items: Vec<CommandItem>) {
        self.items = Rc::from(items);
        if let Some(session) = &mut self.session {
            session.container.set_items(Rc::clone(&self.items));
        }
    }

    pub fn open(&mut self) {
        if self.session.is_some() {
            return;
        }
        self.session = Some(OpenSession {
            container: CommandContainer::new(Rc::clone(&self.items)),
            outside: OutsideClick::attach(),
            _scroll: self.scroll_lock.acquire(),
        });
    }

    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.outside.detach();
        }
    }

    pub fn toggle(&mut self) {
        if self.is_visible() {
            self.close();
        } else {
            self.open();
        }
    }

    pub fn handle_event(&mut self, event: &Event) -> PaletteOutcome {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.on_key(*key),
            Event::Key(_) if self.is_visible() => PaletteOutcome::Handled,
            Event::Mouse(mouse) if self.is_visible() => self.on_mouse(mouse),
            _ => PaletteOutcome::Ignored,
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> PaletteOutcome {
        if self.settings.hotkey.matches(&key) {
            self.toggle();
            return if self.is_visible() {
                PaletteOutcome::Opened
            } else {
                PaletteOutcome::Closed
            };
        }

        let Some(session) = &mut self.session else {
            return PaletteOutcome::Ignored;
        };

        match session.container.on_key(key) {
            ContainerAction::None => PaletteOutcome::Handled,
            ContainerAction::Close => {
                self.close();
                PaletteOutcome::Closed
            }
            ContainerAction::Accept(item) => {
                if self.settings.close_on_accept {
                    self.close();
                }
                PaletteOutcome::Accepted(item)
            }
        }
    }

    fn on_mouse(&mut self, mouse: &MouseEvent) -> PaletteOutcome {
        let Some(session) = &mut self.session else {
            return PaletteOutcome::Ignored;
        };

        let mut outside = false;
        session.outside.handle(mouse, || outside = true);
        if outside {
            self.close();
            PaletteOutcome::Closed
        } else {
            PaletteOutcome::Handled
        }
    }
}
