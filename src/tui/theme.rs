use ratatui::style::{Color, Modifier, Style};

pub struct Theme;

impl Theme {
    // Dracula palette
    pub const BG: Color = Color::Rgb(40, 42, 54);
    pub const FG: Color = Color::Rgb(248, 248, 242);
    pub const COMMENT: Color = Color::Rgb(98, 114, 164);
    pub const CYAN: Color = Color::Rgb(139, 233, 253);
    pub const GREEN: Color = Color::Rgb(80, 250, 123);
    pub const PINK: Color = Color::Rgb(255, 121, 198);
    pub const YELLOW: Color = Color::Rgb(241, 250, 140);

    pub fn title() -> Style {
        Style::default()
            .fg(Self::FG)
            .bg(Self::BG)
            .add_modifier(Modifier::BOLD)
    }

    pub fn group() -> Style {
        Style::default().fg(Self::CYAN)
    }
    pub fn host() -> Style {
        Style::default().fg(Self::FG)
    }
    pub fn parent() -> Style {
        Style::default().fg(Self::YELLOW)
    }
    pub fn prompt() -> Style {
        Style::default().fg(Self::GREEN).add_modifier(Modifier::BOLD)
    }
    pub fn selected() -> Style {
        Style::default()
            .fg(Self::PINK)
            .add_modifier(Modifier::REVERSED | Modifier::BOLD)
    }
    pub fn hint() -> Style {
        Style::default().fg(Self::COMMENT)
    }
}
