use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    Quit,
    MoveUp,
    MoveDown,
    MoveToTop,
    MoveToBottom,
    CycleSort,
    Reload,
    NewSummary,
    ShowHelp,
    HideHelp,
    // New summary popup actions
    InputChar(char),
    InputBackspace,
    InputNextField,
    InputCycleLength,
    InputConfirm,
    InputCancel,
}

pub fn handle_key_event(key: KeyEvent, input_active: bool, show_help: bool) -> Option<AppAction> {
    // If help is showing, any key closes it
    if show_help {
        return Some(AppAction::HideHelp);
    }

    // New summary popup
    if input_active {
        return match key.code {
            KeyCode::Enter => Some(AppAction::InputConfirm),
            KeyCode::Esc => Some(AppAction::InputCancel),
            KeyCode::Backspace => Some(AppAction::InputBackspace),
            KeyCode::Tab => Some(AppAction::InputNextField),
            KeyCode::BackTab => Some(AppAction::InputCycleLength),
            KeyCode::Char(c) => Some(AppAction::InputChar(c)),
            _ => None,
        };
    }

    // Normal mode
    match (key.code, key.modifiers) {
        (KeyCode::Char('q'), _) => Some(AppAction::Quit),
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(AppAction::Quit),

        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(AppAction::MoveDown),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(AppAction::MoveUp),
        (KeyCode::Char('<'), _) | (KeyCode::Home, _) => Some(AppAction::MoveToTop),
        (KeyCode::Char('>'), _) | (KeyCode::End, _) => Some(AppAction::MoveToBottom),

        (KeyCode::Char('s'), _) => Some(AppAction::CycleSort),
        (KeyCode::Char('r'), _) => Some(AppAction::Reload),
        (KeyCode::Char('n'), _) => Some(AppAction::NewSummary),

        (KeyCode::Char('?'), _) => Some(AppAction::ShowHelp),

        _ => None,
    }
}
