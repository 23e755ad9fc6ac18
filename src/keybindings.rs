/// Centralized keybinding definitions for portwatch
/// The help overlay and status bar are generated from this table

#[derive(Debug, Clone)]
pub struct KeyBinding {
    pub key: &'static str,
    pub description: &'static str,
    pub category: KeyCategory,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyCategory {
    Navigation,
    Filtering,
    Actions,
    System,
}

impl KeyCategory {
    pub fn title(&self) -> &'static str {
        match self {
            KeyCategory::Navigation => "Navigation",
            KeyCategory::Filtering => "Filtering",
            KeyCategory::Actions => "Actions",
            KeyCategory::System => "System",
        }
    }

    pub fn all() -> [KeyCategory; 4] {
        [
            KeyCategory::Navigation,
            KeyCategory::Filtering,
            KeyCategory::Actions,
            KeyCategory::System,
        ]
    }
}

/// Get all keybindings
pub fn get_all_keybindings() -> Vec<KeyBinding> {
    vec![
        // Navigation
        KeyBinding {
            key: "↑/k",
            description: "Move selection up",
            category: KeyCategory::Navigation,
        },
        KeyBinding {
            key: "↓/j",
            description: "Move selection down",
            category: KeyCategory::Navigation,
        },
        KeyBinding {
            key: "Home/End",
            description: "Jump to first / last row",
            category: KeyCategory::Navigation,
        },
        // Filtering
        KeyBinding {
            key: "p or /",
            description: "Edit port filter",
            category: KeyCategory::Filtering,
        },
        KeyBinding {
            key: "n",
            description: "Edit process name filter",
            category: KeyCategory::Filtering,
        },
        KeyBinding {
            key: "c",
            description: "Clear filters",
            category: KeyCategory::Filtering,
        },
        // Actions
        KeyBinding {
            key: "r",
            description: "Refresh now",
            category: KeyCategory::Actions,
        },
        KeyBinding {
            key: "Enter/d",
            description: "Show process details",
            category: KeyCategory::Actions,
        },
        KeyBinding {
            key: "x",
            description: "Terminate selected process",
            category: KeyCategory::Actions,
        },
        KeyBinding {
            key: "X",
            description: "Force kill selected process",
            category: KeyCategory::Actions,
        },
        // System
        KeyBinding {
            key: "T",
            description: "Toggle dark/light theme",
            category: KeyCategory::System,
        },
        KeyBinding {
            key: "h/?",
            description: "Toggle this help",
            category: KeyCategory::System,
        },
        KeyBinding {
            key: "q/Esc/Ctrl+C",
            description: "Quit",
            category: KeyCategory::System,
        },
    ]
}

/// Get keybindings for the status bar (most common ones)
pub fn get_status_bar_keybindings() -> Vec<(&'static str, &'static str)> {
    vec![
        ("r", "Refresh"),
        ("p/n", "Filter"),
        ("x", "Kill"),
        ("h", "Help"),
        ("q", "Quit"),
    ]
}
