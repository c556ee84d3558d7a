//! Full-screen host picker

pub mod app;
pub mod theme;
pub mod ui;

use crate::config::Node;

/// Let the user choose a host from the tree; `None` if they quit
pub fn pick(nodes: &[Node]) -> anyhow::Result<Option<Node>> {
    if nodes.is_empty() {
        anyhow::bail!("no hosts configured");
    }
    app::run(nodes)
}
