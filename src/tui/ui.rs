use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputField};
use crate::models::PipelineStage;

pub fn draw(frame: &mut Frame, app: &App) {
    // Main horizontal split: 1/3 left, 2/3 right
    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(1, 3), // Left pane: saved summaries
            Constraint::Ratio(2, 3), // Right pane: selected summary
        ])
        .split(frame.area());

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(0),    // Summary list
            Constraint::Length(1), // Key hints
        ])
        .split(main_chunks[0]);

    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Book title
            Constraint::Min(0),    // Summary body
            Constraint::Length(1), // Pipeline status
        ])
        .split(main_chunks[1]);

    render_header(frame, app, left_chunks[0]);
    render_summary_list(frame, app, left_chunks[1]);
    render_left_status(frame, left_chunks[2]);

    render_book_title(frame, app, right_chunks[0]);
    render_summary(frame, app, right_chunks[1]);
    render_right_status(frame, app, right_chunks[2]);

    if app.input_active {
        render_new_summary_input(frame, app);
    }

    if app.show_help {
        render_help(frame);
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let title = format!(" Book Summaries [Sort: {}] ", app.sort_mode().label());
    let stats = match app.saved.as_ref() {
        Some(saved) => format!(" {} Summaries | {}", app.summaries().len(), saved.user_id()),
        None => " Not signed in".to_string(),
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let paragraph = Paragraph::new(stats).style(Style::default().fg(Color::White));
    frame.render_widget(paragraph, inner);
}

fn render_summary_list(frame: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .summaries()
        .iter()
        .map(|record| {
            let line = Line::from(vec![
                Span::styled(
                    format!("#{:<4}", record.summary_id),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    format!("[{}] ", record.length),
                    Style::default().fg(Color::Blue),
                ),
                Span::styled(record.book_name.as_str(), Style::default().fg(Color::White)),
            ]);

            ListItem::new(line)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(Some(app.selected_index));

    frame.render_stateful_widget(list, area, &mut state);
}

fn render_left_status(frame: &mut Frame, area: Rect) {
    let status = "j/k:nav  n:new  s:sort  r:reload  ?:help  q:quit";
    let paragraph = Paragraph::new(status).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
}

fn render_book_title(frame: &mut Frame, app: &App, area: Rect) {
    let title = app
        .selected_summary()
        .map(|s| s.book_name.as_str())
        .unwrap_or("No summary selected");

    let block = Block::default()
        .title(" Book ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let paragraph = Paragraph::new(title)
        .block(block)
        .wrap(Wrap { trim: true });

    frame.render_widget(paragraph, area);
}

fn render_summary(frame: &mut Frame, app: &App, area: Rect) {
    let content = if app.saved.is_none() {
        "Not signed in.\n\nSet user_id in:\n~/.config/book-summary/config.toml\n\nor pass --user <id>".to_string()
    } else if app.saved.as_ref().is_some_and(|s| !s.is_loaded()) {
        "Could not load saved summaries. Press 'r' to retry.".to_string()
    } else if let Some(record) = app.selected_summary() {
        let prompt = if record.add_prompt.is_empty() {
            "-"
        } else {
            record.add_prompt.as_str()
        };
        format!(
            "Prompt: {}\nLength: {}\n{}\n\n{}",
            prompt, record.length, record.timestamp_formatted, record.summary
        )
    } else {
        "No saved summaries yet. Press 'n' to request one.".to_string()
    };

    let block = Block::default()
        .title(" Summary ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    let paragraph = Paragraph::new(content)
        .block(block)
        .wrap(Wrap { trim: true });

    frame.render_widget(paragraph, area);
}

fn render_right_status(frame: &mut Frame, app: &App, area: Rect) {
    let stage = match app.stage {
        PipelineStage::Idle | PipelineStage::Complete => String::new(),
        PipelineStage::Failed => "Failed".to_string(),
        busy => format!("{} {}...", app.spinner(), busy),
    };

    let text = match (&app.status_message, stage.is_empty()) {
        (Some(message), true) => message.clone(),
        (Some(message), false) => format!("{stage} | {message}"),
        (None, true) if !app.has_api_key => "No API key".to_string(),
        (None, false) if !app.has_api_key => format!("{stage} | No API key"),
        (None, _) => stage,
    };

    let color = if app.stage == PipelineStage::Failed {
        Color::Red
    } else {
        Color::DarkGray
    };

    let paragraph = Paragraph::new(text).style(Style::default().fg(color));
    frame.render_widget(paragraph, area);
}

fn render_new_summary_input(frame: &mut Frame, app: &App) {
    let area = centered_rect(60, 30, frame.area());

    let block = Block::default()
        .title(" New summary - Tab: switch field, Shift+Tab: length, Enter: request ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let inner = block.inner(area);

    frame.render_widget(Clear, area);
    frame.render_widget(block, area);

    let field_line = |label: &str, value: &str, field: InputField| {
        let focused = app.input_field == field;
        let cursor = if focused { "_" } else { "" };
        let style = if focused {
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        Line::from(vec![
            Span::styled(format!("{label:<8}"), Style::default().fg(Color::Yellow)),
            Span::styled(format!("> {value}{cursor}"), style),
        ])
    };

    let lines = vec![
        field_line("Book", &app.book_input, InputField::Book),
        field_line("Prompt", &app.prompt_input, InputField::Prompt),
        Line::from(vec![
            Span::styled(format!("{:<8}", "Length"), Style::default().fg(Color::Yellow)),
            Span::styled(app.input_length.to_string(), Style::default().fg(Color::Cyan)),
        ]),
    ];

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, inner);
}

fn render_help(frame: &mut Frame) {
    let area = centered_rect(50, 60, frame.area());

    let help_text = vec![
        "",
        " Navigation:",
        "   j / ↓    Move down",
        "   k / ↑    Move up",
        "   < / >    First / last summary",
        "",
        " Actions:",
        "   n        Request a new summary",
        "   s        Cycle sort (ID, Name, Length, Date)",
        "   r        Reload saved summaries",
        "",
        " General:",
        "   ?        Toggle this help",
        "   q        Quit",
        "",
        " Press any key to close",
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(help_text.join("\n"))
        .block(block)
        .style(Style::default().fg(Color::White));

    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
