//! UI rendering module.
//!
//! Contains all the widget rendering logic (View).

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span, Text},
    widgets::{Block, Borders, Gauge, List, ListItem, Padding, Paragraph, Tabs, Wrap},
};

use crate::app::{App, DeviceStatus, Focus, Level, LogEntry, Tab, TrafficEntry};
use swapup_core::transport;
use swapup_core::upgrade::UpgradeState;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();

    // Create main layout
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header/tabs
            Constraint::Min(10),   // Main content
            Constraint::Length(3), // Footer/status bar
        ])
        .split(area);

    draw_header(frame, chunks[0], app);

    match app.current_tab {
        Tab::Main => draw_main_view(frame, chunks[1], app),
        Tab::Logs => draw_logs_view(frame, chunks[1], app),
        Tab::Traffic => draw_traffic_view(frame, chunks[1], app),
        Tab::Help => draw_help_view(frame, chunks[1]),
    }

    draw_footer(frame, chunks[2], app);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let titles = vec!["Main", "Logs (F2)", "Traffic (F3)", "Help (F1)"];
    let selected = match app.current_tab {
        Tab::Main => 0,
        Tab::Logs => 1,
        Tab::Traffic => 2,
        Tab::Help => 3,
    };

    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" SwapUp TUI ")
                .title_style(
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
        )
        .select(selected)
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .divider(symbols::DOT);

    frame.render_widget(tabs, area);
}

fn draw_footer(frame: &mut Frame, area: Rect, app: &App) {
    let status = match &app.device_status {
        DeviceStatus::Disconnected => {
            Span::styled(" ○ Disconnected ", Style::default().fg(Color::Red))
        }
        DeviceStatus::Connected { label } => Span::styled(
            format!(" ● {} ", label),
            Style::default().fg(Color::Green),
        ),
    };

    let state = Span::styled(format!(" {} ", app.state), Style::default().fg(Color::Cyan));

    let paused = if app.is_paused() {
        Span::styled(" PAUSED ", Style::default().fg(Color::Yellow))
    } else {
        Span::raw("")
    };

    let help = Span::styled(
        " Ctrl+Q: Quit | Tab: Focus | s: Start | p/r/c: Pause/Resume/Cancel ",
        Style::default().fg(Color::DarkGray),
    );

    let line = Line::from(vec![status, state, paused, help]);

    let footer = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );

    frame.render_widget(footer, area);
}

fn draw_main_view(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(40), // Package & controls
            Constraint::Percentage(60), // Status & progress
        ])
        .split(area);

    draw_package_panel(frame, chunks[0], app);
    draw_status_panel(frame, chunks[1], app);
}

fn draw_package_panel(frame: &mut Frame, area: Rect, app: &App) {
    let is_focused = app.focus == Focus::Path;
    let border_color = if is_focused {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Package ")
        .title_style(Style::default().fg(if is_focused {
            Color::Yellow
        } else {
            Color::White
        }))
        .padding(Padding::horizontal(1));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // Path input
            Constraint::Length(2), // Backend + mode
            Constraint::Min(1),    // Image list
        ])
        .split(inner);

    // Path input field
    let input_area_width = layout[0].width.saturating_sub(8) as usize;
    let value = &app.package_path;
    let display_value = if value.len() > input_area_width && input_area_width > 3 {
        format!("...{}", &value[value.len() - (input_area_width - 3)..])
    } else {
        value.to_string()
    };
    let cursor = if is_focused { "▏" } else { "" };

    let input = Paragraph::new(Line::from(vec![
        Span::styled("Path: ", Style::default().fg(Color::Cyan)),
        Span::styled(
            display_value,
            Style::default().fg(if is_focused {
                Color::Yellow
            } else {
                Color::White
            }),
        ),
        Span::styled(cursor, Style::default().fg(Color::Yellow)),
    ]))
    .block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_style(if is_focused {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::DarkGray)
            }),
    );
    frame.render_widget(input, layout[0]);

    // Backend + mode line
    let backend = if app.use_mock { "mock" } else { "usb" };
    let settings = Paragraph::new(Line::from(vec![
        Span::styled("Device: ", Style::default().fg(Color::Cyan)),
        Span::styled(backend, Style::default().fg(Color::White)),
        Span::styled(" (m)  ", Style::default().fg(Color::DarkGray)),
        Span::styled("Mode: ", Style::default().fg(Color::Cyan)),
        Span::styled(format!("{}", app.mode), Style::default().fg(Color::White)),
        Span::styled(" (1/2/3)", Style::default().fg(Color::DarkGray)),
    ]));
    frame.render_widget(settings, layout[1]);

    // Loaded images
    let items: Vec<ListItem> = if app.images.is_empty() {
        vec![ListItem::new(Span::styled(
            "No package loaded (Enter loads the path)",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        app.images
            .iter()
            .map(|image| {
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("{:<9}", image.core().to_string()),
                        Style::default().fg(Color::Cyan),
                    ),
                    Span::styled(
                        format!("v{:<10}", image.version().to_string()),
                        Style::default().fg(Color::White),
                    ),
                    Span::styled(
                        format!("{:>10}  ", image.size_label()),
                        Style::default().fg(Color::White),
                    ),
                    Span::styled(image.digest_label(), Style::default().fg(Color::DarkGray)),
                ]))
            })
            .collect()
    };

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::NONE)
            .title(" Images ")
            .title_style(Style::default().fg(Color::White)),
    );
    frame.render_widget(list, layout[2]);
}

fn draw_status_panel(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Progress
            Constraint::Min(5),    // Recent logs
        ])
        .split(area);

    draw_progress(frame, chunks[0], app);
    draw_recent_logs(frame, chunks[1], app);
}

fn draw_progress(frame: &mut Frame, area: Rect, app: &App) {
    let color = match app.state {
        UpgradeState::Success => Color::Green,
        UpgradeState::Failed => Color::Red,
        UpgradeState::Cancelled => Color::Yellow,
        _ => Color::Cyan,
    };

    let (percent, label) = match &app.progress {
        Some(sample) => (
            sample.percent() as u16,
            format!(
                "{}: {}/{} ({}%)",
                app.state,
                sample.bytes_sent,
                sample.image_size,
                sample.percent()
            ),
        ),
        None => (0, format!("{}", app.state)),
    };

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(" Progress "),
        )
        .gauge_style(Style::default().fg(color).bg(Color::Black))
        .percent(percent.min(100))
        .label(label);

    frame.render_widget(gauge, area);
}

fn draw_recent_logs(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .logs
        .iter()
        .rev()
        .take(area.height.saturating_sub(2) as usize)
        .map(|entry| log_to_list_item(entry, area.width))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(" Recent Logs "),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(list, area);
}

fn draw_logs_view(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .logs
        .iter()
        .skip(app.log_scroll)
        .take(area.height.saturating_sub(2) as usize)
        .map(|entry| log_to_list_item(entry, area.width))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(format!(
                    " Logs ({}/{}) ",
                    app.log_scroll + 1,
                    app.logs.len().max(1)
                )),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(list, area);
}

fn draw_traffic_view(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .packets
        .iter()
        .skip(app.packet_scroll)
        .take(area.height.saturating_sub(2) as usize)
        .map(traffic_to_list_item)
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(format!(
                    " Traffic ({}/{}) ",
                    app.packet_scroll + 1,
                    app.packets.len().max(1)
                )),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(list, area);
}

fn traffic_to_list_item(entry: &TrafficEntry) -> ListItem<'static> {
    let record = &entry.record;
    let (arrow, color) = match record.direction {
        transport::Direction::Tx => ("→", Color::Cyan),
        transport::Direction::Rx => ("←", Color::Green),
    };

    let preview = record
        .preview
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");

    ListItem::new(Line::from(vec![
        Span::styled(
            format!("{} ", entry.timestamp),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(format!("{} {} ", arrow, record.direction), Style::default().fg(color)),
        Span::styled(
            format!("{:<6} {:>5}  ", record.label, record.length),
            Style::default().fg(Color::White),
        ),
        Span::styled(preview, Style::default().fg(Color::DarkGray)),
    ]))
}

fn draw_help_view(frame: &mut Frame, area: Rect) {
    let help_text = vec![
        "",
        "  SwapUp TUI - Dual-core firmware upgrade tool",
        "",
        "  KEYBOARD SHORTCUTS:",
        "",
        "  Ctrl+Q, Ctrl+C, Esc    Quit application",
        "  F1                     Show this help",
        "  F2                     View full logs",
        "  F3                     View device traffic",
        "  Tab                    Switch focus between path and controls",
        "",
        "  WITH CONTROLS FOCUSED:",
        "",
        "  m                      Toggle mock device",
        "  1 / 2 / 3              Mode: test+confirm / test-only / confirm-only",
        "  s, Enter               Start upgrade",
        "  p / r / c              Pause / resume / cancel",
        "  q                      Quit",
        "",
        "  IN LOGS/TRAFFIC VIEW:",
        "",
        "  j/k, Up/Down           Scroll",
        "  Page Up/Down           Scroll by page",
        "  Home/End               Go to start/end",
        "",
        "  USAGE:",
        "",
        "  1. Type a .swpk path and press Enter to load it",
        "  2. Tab to the controls, pick a mode, press s",
        "  3. Watch the progress and logs",
        "",
        "  Press any key to return...",
    ];

    let text: Vec<Line> = help_text.iter().map(|s| Line::from(*s)).collect();

    let help = Paragraph::new(Text::from(text))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Help "),
        )
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: false });

    frame.render_widget(help, area);
}

fn log_to_list_item(entry: &LogEntry, width: u16) -> ListItem<'static> {
    let (icon, color) = match entry.level {
        Level::Error => ("✗", Color::Red),
        Level::Warn => ("⚠", Color::Yellow),
        Level::Info => ("●", Color::Green),
    };

    let time_len = entry.timestamp.len() + 1; // +1 for space
    let icon_len = 2; // 1 char + 1 space

    // Calculate available width for message
    let msg_width = width.saturating_sub((time_len + icon_len + 4) as u16) as usize;

    // Simple wrapping
    let message = &entry.message;
    let mut lines = Vec::new();

    if message.len() <= msg_width {
        ListItem::new(Line::from(vec![
            Span::styled(
                format!("{} ", entry.timestamp),
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(format!("{} ", icon), Style::default().fg(color)),
            Span::styled(message.clone(), Style::default().fg(Color::White)),
        ]))
    } else {
        // First line
        let (first, rest) = message.split_at(std::cmp::min(message.len(), msg_width));
        lines.push(Line::from(vec![
            Span::styled(
                format!("{} ", entry.timestamp),
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(format!("{} ", icon), Style::default().fg(color)),
            Span::styled(first.to_string(), Style::default().fg(Color::White)),
        ]));

        // Subsequent lines
        let chars: Vec<char> = rest.chars().collect();
        for chunk in chars.chunks(msg_width.max(1)) {
            let s: String = chunk.iter().collect();
            lines.push(Line::from(vec![
                Span::raw(" ".repeat(time_len + icon_len)), // Indent
                Span::styled(s, Style::default().fg(Color::White)),
            ]));
        }
        ListItem::new(Text::from(lines))
    }
}
