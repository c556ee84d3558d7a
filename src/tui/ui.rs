use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use super::{
    app::{Item, Picker},
    theme::Theme,
};
use crate::config::Node;

const PARENT_LABEL: &str = "-parent-";

pub fn draw(f: &mut Frame, picker: &Picker) {
    let background = Block::default().style(Style::default().bg(Theme::BG));
    f.render_widget(background, f.size());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(2),
        ])
        .split(f.size());

    let title = if picker.depth() > 1 {
        " Select host (group) "
    } else {
        " Select host "
    };
    let search = Paragraph::new(Line::from(vec![
        Span::styled("search: ", Theme::prompt()),
        Span::styled(picker.query.as_str(), Style::default().fg(Theme::FG)),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Theme::COMMENT))
            .title(Span::styled(title, Theme::title())),
    );
    f.render_widget(search, chunks[0]);

    let items = picker.items();
    let width = name_width(&items);
    let rows: Vec<ListItem> = items
        .iter()
        .map(|item| match item {
            Item::Parent => ListItem::new(Span::styled(PARENT_LABEL, Theme::parent())),
            Item::Node(n) => {
                let style = if n.is_group() {
                    Theme::group()
                } else {
                    Theme::host()
                };
                ListItem::new(Span::styled(row_label(n, width), style))
            }
        })
        .collect();

    let mut state = ListState::default();
    if !items.is_empty() {
        state.select(Some(picker.selected));
    }
    let list = List::new(rows)
        .block(Block::default().borders(Borders::NONE))
        .highlight_style(Theme::selected())
        .highlight_symbol("> ");
    f.render_stateful_widget(list, chunks[1], &mut state);

    let hints = Paragraph::new(Line::from(Span::styled(
        " [↑↓]move [Enter]select [Esc]back/clear [type]search [Ctrl+C]quit",
        Theme::hint(),
    )))
    .block(
        Block::default()
            .borders(Borders::TOP)
            .border_style(Style::default().fg(Theme::COMMENT)),
    );
    f.render_widget(hints, chunks[2]);
}

/// Widest node name among the rows, in terminal columns
pub fn name_width(items: &[Item]) -> usize {
    items
        .iter()
        .filter_map(|i| match i {
            Item::Node(n) => Some(UnicodeWidthStr::width(n.name.as_str())),
            Item::Parent => None,
        })
        .max()
        .unwrap_or(0)
}

/// `name  user@host[:port]  (alias)` with the name padded to `name_width`
/// columns. Groups show their size instead of an address.
pub fn row_label(node: &Node, name_width: usize) -> String {
    let pad = name_width.saturating_sub(UnicodeWidthStr::width(node.name.as_str()));
    let mut s = format!("{}{}", node.name, " ".repeat(pad));
    if node.is_group() {
        s.push_str(&format!("  [{} hosts]", node.children.len()));
        return s;
    }
    s.push_str("  ");
    s.push_str(&node.destination());
    if let Some(port) = node.port {
        s.push_str(&format!(":{}", port));
    }
    if let Some(ref alias) = node.alias {
        s.push_str(&format!("  ({})", alias));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_label_aligns_wide_names() {
        let web = Node {
            name: "web".into(),
            host: "10.0.0.10".into(),
            user: Some("deploy".into()),
            port: Some(2222),
            alias: Some("w".into()),
            ..Default::default()
        };
        let cjk = Node {
            name: "数据库".into(),
            host: "10.0.1.5".into(),
            ..Default::default()
        };
        let items = [Item::Node(&web), Item::Node(&cjk), Item::Parent];
        let width = name_width(&items);
        assert_eq!(width, 6);
        assert_eq!(row_label(&web, width), "web     deploy@10.0.0.10:2222  (w)");
        assert_eq!(row_label(&cjk, width), "数据库  10.0.1.5");
    }

    #[test]
    fn test_row_label_group() {
        let group = Node {
            name: "prod".into(),
            children: vec![Node::default(), Node::default()],
            ..Default::default()
        };
        assert_eq!(row_label(&group, 4), "prod  [2 hosts]");
    }
}
