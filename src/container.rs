use std::rc::Rc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::model::CommandItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

impl Direction {
    fn delta(self) -> isize {
        match self {
            Direction::Next => 1,
            Direction::Previous => -1,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ContainerAction {
    None,
    Close,
    Accept(CommandItem),
}

/// Query, filtered view, and highlighted key for one open palette.
///
/// Every mutation ends by recomputing the derived state explicitly: a query
/// change refilters, and a refilter always resets the selection to the top row.
pub struct CommandContainer {
    items: Rc<[CommandItem]>,
    query: String,
    query_cursor: usize,
    filtered: Vec<usize>,
    selection: Option<String>,
}

impl CommandContainer {
    pub fn new(items: Rc<[CommandItem]>) -> Self {
        let mut container = Self {
            items,
            query: String::new(),
            query_cursor: 0,
            filtered: Vec::new(),
            selection: None,
        };
        container.refresh_filtered();
        container
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn query_cursor(&self) -> usize {
        self.query_cursor
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn filtered(&self) -> impl Iterator<Item = &CommandItem> + '_ {
        self.filtered.iter().map(|&index| &self.items[index])
    }

    pub fn filtered_len(&self) -> usize {
        self.filtered.len()
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    pub fn selected_index(&self) -> Option<usize> {
        let key = self.selection.as_deref()?;
        self.filtered
            .iter()
            .position(|&index| self.items[index].key == key)
    }

    /// Swaps the source list. The query belongs to the old list, so it resets too.
    pub fn set_items(&mut self, items: Rc<[CommandItem]>) {
        self.items = items;
        self.query.clear();
        self.query_cursor = 0;
        self.refresh_filtered();
    }

    pub fn set_query(&mut self, text: impl Into<String>) {
        self.query = text.into();
        self.query_cursor = self.query.chars().count();
        self.refresh_filtered();
    }

    pub fn recompute_selection(&mut self) {
        self.selection = self
            .filtered
            .first()
            .map(|&index| self.items[index].key.clone());
    }

    pub fn move_selection(&mut self, direction: Direction) {
        if self.filtered.is_empty() {
            return;
        }

        let len = self.filtered.len() as isize;
        let current = self.selected_index().unwrap_or(0) as isize;
        let next = (current + direction.delta()).rem_euclid(len) as usize;
        self.selection = Some(self.items[self.filtered[next]].key.clone());
    }

    pub fn accept_selection(&self) -> Option<CommandItem> {
        let index = self.selected_index()?;
        Some(self.items[self.filtered[index]].clone())
    }

    pub fn on_key(&mut self, key: KeyEvent) -> ContainerAction {
        match key.code {
            KeyCode::Esc => ContainerAction::Close,
            KeyCode::Enter => match self.accept_selection() {
                Some(item) => ContainerAction::Accept(item),
                None => ContainerAction::None,
            },
            KeyCode::Up | KeyCode::BackTab => {
                self.move_selection(Direction::Previous);
                ContainerAction::None
            }
            KeyCode::Down | KeyCode::Tab => {
                self.move_selection(Direction::Next);
                ContainerAction::None
            }
            KeyCode::Char('k') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.move_selection(Direction::Previous);
                ContainerAction::None
            }
            KeyCode::Char('j') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.move_selection(Direction::Next);
                ContainerAction::None
            }
            KeyCode::Left => {
                self.query_cursor = self.query_cursor.saturating_sub(1);
                ContainerAction::None
            }
            KeyCode::Right => {
                if self.query_cursor < self.query.chars().count() {
                    self.query_cursor += 1;
                }
                ContainerAction::None
            }
            KeyCode::Home => {
                self.query_cursor = 0;
                ContainerAction::None
            }
            KeyCode::End => {
                self.query_cursor = self.query.chars().count();
                ContainerAction::None
            }
            KeyCode::Backspace => {
                if self.query_cursor > 0 {
                    let mut query = self.query.clone();
                    if remove_char_at(&mut query, self.query_cursor - 1) {
                        self.edit_query(query, self.query_cursor - 1);
                    }
                }
                ContainerAction::None
            }
            KeyCode::Delete => {
                let mut query = self.query.clone();
                if remove_char_at(&mut query, self.query_cursor) {
                    self.edit_query(query, self.query_cursor);
                }
                ContainerAction::None
            }
            KeyCode::Char(ch)
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT =>
            {
                let mut query = self.query.clone();
                insert_char_at(&mut query, self.query_cursor, ch);
                self.edit_query(query, self.query_cursor + 1);
                ContainerAction::None
            }
            _ => ContainerAction::None,
        }
    }

    fn edit_query(&mut self, query: String, cursor: usize) {
        self.set_query(query);
        self.query_cursor = cursor;
    }

    fn refresh_filtered(&mut self) {
        self.filtered = filter_indices(&self.items, &self.query);
        self.recompute_selection();
    }
}

/// Indices of items whose name contains `query`, ignoring case, in source order.
pub fn filter_indices(items: &[CommandItem], query: &str) -> Vec<usize> {
    if query.is_empty() {
        return (0..items.len()).collect();
    }

    let needle = query.to_lowercase();
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.name.to_lowercase().contains(&needle))
        .map(|(index, _)| index)
        .collect()
}

fn insert_char_at(value: &mut String, char_index: usize, ch: char) {
    let byte_index = byte_index_for_char(value, char_index);
    value.insert(byte_index, ch);
}

fn remove_char_at(value: &mut String, char_index: usize) -> bool {
    let start = byte_index_for_char(value, char_index);
    if start >= value.len() {
        return false;
    }
    let end = byte_index_for_char(value, char_index + 1);
    value.replace_range(start..end, "");
    true
}

fn byte_index_for_char(value: &str, char_index: usize) -> usize {
    value
        .char_indices()
        .nth(char_index)
        .map(|(index, _)| index)
        .unwrap_or(value.len())
}
