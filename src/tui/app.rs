use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Write};
use std::time::Duration;

use super::ui;
use crate::config::Node;

/// Terminal guard that ensures proper cleanup on drop
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = io::stdout().flush();
    }
}

/// One row of the list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item<'a> {
    /// Back to the enclosing group
    Parent,
    Node(&'a Node),
}

/// What a key press did to the picker
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome<'a> {
    Continue,
    Chosen(&'a Node),
    Quit,
}

/// Nodes whose `name user host` contains every space-separated keyword.
/// An empty query keeps everything.
pub fn filter<'a>(nodes: &'a [Node], query: &str) -> Vec<&'a Node> {
    let keys: Vec<&str> = query.split_whitespace().collect();
    nodes
        .iter()
        .filter(|n| {
            let text = n.search_text();
            keys.iter().all(|k| text.contains(k))
        })
        .collect()
}

pub struct Picker<'a> {
    /// Levels entered so far; the last is on screen
    stack: Vec<&'a [Node]>,
    pub query: String,
    pub selected: usize,
}

impl<'a> Picker<'a> {
    pub fn new(nodes: &'a [Node]) -> Self {
        Self {
            stack: vec![nodes],
            query: String::new(),
            selected: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Rows for the current level. The parent row is hidden while searching.
    pub fn items(&self) -> Vec<Item<'a>> {
        let current = self.stack.last().copied().unwrap_or_default();
        let mut items = Vec::new();
        if self.stack.len() > 1 && self.query.is_empty() {
            items.push(Item::Parent);
        }
        items.extend(filter(current, &self.query).into_iter().map(Item::Node));
        items
    }

    pub fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn move_down(&mut self) {
        let len = self.items().len();
        if self.selected + 1 < len {
            self.selected += 1;
        }
    }

    pub fn push_char(&mut self, c: char) {
        self.query.push(c);
        self.selected = 0;
    }

    pub fn pop_char(&mut self) {
        self.query.pop();
        self.selected = 0;
    }

    /// Descend into groups, climb on the parent row, return a chosen host
    pub fn enter(&mut self) -> Option<&'a Node> {
        let item = self.items().get(self.selected).copied()?;
        match item {
            Item::Parent => {
                self.back();
                None
            }
            Item::Node(n) if n.is_group() => {
                self.stack.push(&n.children);
                self.query.clear();
                self.selected = 0;
                None
            }
            Item::Node(n) => Some(n),
        }
    }

    /// Leave the current group; false at the top level
    pub fn back(&mut self) -> bool {
        if self.stack.len() <= 1 {
            return false;
        }
        self.stack.pop();
        self.query.clear();
        self.selected = 0;
        true
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Outcome<'a> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('d') if ctrl => Outcome::Quit,
            KeyCode::Char('p') if ctrl => {
                self.move_up();
                Outcome::Continue
            }
            KeyCode::Char('n') if ctrl => {
                self.move_down();
                Outcome::Continue
            }
            KeyCode::Up => {
                self.move_up();
                Outcome::Continue
            }
            KeyCode::Down | KeyCode::Tab => {
                self.move_down();
                Outcome::Continue
            }
            KeyCode::Enter => match self.enter() {
                Some(n) => Outcome::Chosen(n),
                None => Outcome::Continue,
            },
            KeyCode::Esc => {
                if !self.query.is_empty() {
                    self.query.clear();
                    self.selected = 0;
                    Outcome::Continue
                } else if self.back() {
                    Outcome::Continue
                } else {
                    Outcome::Quit
                }
            }
            KeyCode::Backspace => {
                self.pop_char();
                Outcome::Continue
            }
            KeyCode::Char(c) if !ctrl => {
                self.push_char(c);
                Outcome::Continue
            }
            _ => Outcome::Continue,
        }
    }
}

/// Show the picker full screen; `None` when the user quits
pub fn run(nodes: &[Node]) -> Result<Option<Node>> {
    // Install panic hook to restore terminal on panic
    let original_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = io::stdout().flush();
        original_panic(info);
    }));

    // Terminal cleanup handled by TerminalGuard
    let _guard = TerminalGuard;
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut picker = Picker::new(nodes);

    let chosen = loop {
        terminal.draw(|f| ui::draw(f, &picker))?;
        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        if let Event::Key(k) = event::read()? {
            if k.kind != KeyEventKind::Press {
                continue;
            }
            match picker.handle_key(k) {
                Outcome::Continue => {}
                Outcome::Chosen(n) => break Some(n.clone()),
                Outcome::Quit => break None,
            }
        }
    };
    terminal.show_cursor()?;
    Ok(chosen)
}
