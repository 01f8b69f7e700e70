use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use payment_dispatch::{Category, DispatchStatus, MailSender, Session};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    Info(String),
    Error(String),
}

pub struct App {
    pub session: Session,
    pub suppliers: Vec<String>,
    pub state: TableState,
    pub show_detail: bool,
    /// Supplier waiting for an explicit yes/no
    pub confirming: Option<String>,
    pub message: Option<StatusMessage>,
    sender: Box<dyn MailSender>,
}

impl App {
    pub fn new(session: Session, sender: Box<dyn MailSender>) -> Self {
        let suppliers = session.suppliers();

        let mut state = TableState::default();
        if !suppliers.is_empty() {
            state.select(Some(0));
        }

        Self {
            session,
            suppliers,
            state,
            show_detail: true,
            confirming: None,
            message: None,
            sender,
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_supplier(&self) -> Option<&String> {
        self.state.selected().and_then(|i| self.suppliers.get(i))
    }

    pub fn next(&mut self) {
        let len = self.suppliers.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.suppliers.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    /// Open the yes/no question for the selected supplier
    pub fn request_send(&mut self) {
        if let Some(name) = self.selected_supplier().cloned() {
            self.confirming = Some(name);
        }
    }

    /// Explicit "yes": the only path that reaches the mail client
    pub fn confirm_yes(&mut self) {
        let Some(name) = self.confirming.take() else {
            return;
        };

        self.message = Some(match self.session.send(&name, self.sender.as_ref()) {
            Ok(dispatched) => StatusMessage::Info(dispatched.delivery.report(&name)),
            Err(err) => StatusMessage::Error(format!("Error al enviar el mail: {:#}", err)),
        });
    }

    pub fn confirm_no(&mut self) {
        let Some(name) = self.confirming.take() else {
            return;
        };

        self.message = Some(match self.session.decline(&name) {
            Ok(()) => StatusMessage::Info(format!("{}: no se envía.", name)),
            Err(err) => StatusMessage::Error(format!("{:#}", err)),
        });
    }

    pub fn stats(&self) -> DispatchStats {
        let mut stats = DispatchStats::default();

        for name in &self.suppliers {
            match self.session.status(name) {
                Some(DispatchStatus::Sent) => stats.sent += 1,
                Some(DispatchStatus::Saved(_)) => stats.saved += 1,
                Some(DispatchStatus::Failed(_)) => stats.failed += 1,
                Some(DispatchStatus::Declined) => stats.declined += 1,
                _ => stats.pending += 1,
            }
        }

        stats
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub pending: usize,
    pub sent: usize,
    pub saved: usize,
    pub declined: usize,
    pub failed: usize,
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        // Raw mode: Ctrl+C llega como tecla, no como SIGINT
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Ok(());
        }

        if app.confirming.is_some() {
            match key.code {
                KeyCode::Char('s') | KeyCode::Char('S') | KeyCode::Char('y') | KeyCode::Char('Y') => {
                    // Envío bloqueante: la UI se congela hasta que el cliente responde
                    app.confirm_yes()
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.confirm_no(),
                _ => {}
            }
            continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
            KeyCode::Enter => app.toggle_detail(),
            KeyCode::Char('s') => app.request_send(),
            KeyCode::Down | KeyCode::Char('j') => app.next(),
            KeyCode::Up | KeyCode::Char('k') => app.previous(),
            KeyCode::Home => {
                if !app.suppliers.is_empty() {
                    app.state.select(Some(0));
                }
            }
            KeyCode::End => {
                if !app.suppliers.is_empty() {
                    app.state.select(Some(app.suppliers.len() - 1));
                }
            }
            _ => {}
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(55), // Supplier list
                Constraint::Percentage(45), // Detail panel
            ])
            .split(chunks[1]);

        render_table(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        render_table(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);

    if let Some(name) = app.confirming.clone() {
        render_confirm_dialog(f, &name);
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let stats = app.stats();

    let spans = vec![
        Span::styled(
            "Envío de Comprobantes de Pago",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Proveedores: {}", app.suppliers.len()),
            Style::default().fg(Color::White),
        ),
        Span::raw("  |  "),
        Span::styled(format!("✓ {}", stats.sent), Style::default().fg(Color::Green)),
        Span::raw("  "),
        Span::styled(format!("📁 {}", stats.saved), Style::default().fg(Color::Yellow)),
        Span::raw("  "),
        Span::styled(format!("✗ {}", stats.failed), Style::default().fg(Color::Red)),
        Span::raw("  "),
        Span::styled(
            format!("… {}", stats.pending),
            Style::default().fg(Color::DarkGray),
        ),
    ];

    let header = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn status_color(status: Option<&DispatchStatus>) -> Color {
    match status {
        Some(DispatchStatus::Sent) => Color::Green,
        Some(DispatchStatus::Saved(_)) => Color::Yellow,
        Some(DispatchStatus::Failed(_)) => Color::Red,
        Some(DispatchStatus::Declined) => Color::DarkGray,
        _ => Color::White,
    }
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Proveedor", "Pagos", "OPs", "CGs", "Estado"].iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows: Vec<Row> = app
        .suppliers
        .iter()
        .filter_map(|name| {
            let bundle = app.session.bundle(name)?;
            let status = app.session.status(name);
            let color = status_color(status);

            Some(Row::new(vec![
                Cell::from(truncate(name, 30)),
                Cell::from(bundle.payment.len().to_string()),
                Cell::from(bundle.order.len().to_string()),
                Cell::from(bundle.credit_note.len().to_string()),
                Cell::from(status.map(|s| s.label()).unwrap_or("-").to_string())
                    .style(Style::default().fg(color)),
            ]))
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Min(20),
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Proveedores "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let mut lines = Vec::new();

    if let Some(name) = app.selected_supplier() {
        lines.push(Line::from(Span::styled(
            name.clone(),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(""));

        if let Some(bundle) = app.session.bundle(name) {
            lines.push(Line::from(vec![
                Span::styled("Emails: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(bundle.email.join(", ")),
            ]));
            lines.push(Line::from(""));

            for category in Category::BUNDLED {
                let files = bundle.files(category);
                lines.push(Line::from(Span::styled(
                    format!("{}: {} archivo(s)", category.name(), files.len()),
                    Style::default().fg(Color::Cyan),
                )));
                for file in files {
                    let file_name = file
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    lines.push(Line::from(format!("  [{}] {}", category.tag(), file_name)));
                }
            }
        }

        if let Some(DispatchStatus::Failed(err)) = app.session.status(name) {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                format!("Último error: {}", err),
                Style::default().fg(Color::Red),
            )));
        }
    } else {
        lines.push(Line::from("Ningún proveedor con archivos asociados."));
    }

    let detail = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" Archivos "),
        );

    f.render_widget(detail, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let line = match &app.message {
        Some(StatusMessage::Info(msg)) => {
            Line::from(Span::styled(msg.clone(), Style::default().fg(Color::Green)))
        }
        Some(StatusMessage::Error(msg)) => {
            Line::from(Span::styled(msg.clone(), Style::default().fg(Color::Red)))
        }
        None => Line::from(Span::styled(
            "↑/↓ mover  Enter detalle  s enviar  q salir",
            Style::default().fg(Color::DarkGray),
        )),
    };

    let status = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(status, area);
}

fn render_confirm_dialog(f: &mut Frame, name: &str) {
    let area = centered_rect(60, 20, f.size());

    let text = vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("¿Querés enviar el mail ahora a {}?", name),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("[s] Sí    [n] No"),
    ];

    let dialog = Paragraph::new(text).wrap(Wrap { trim: true }).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Confirmar envío "),
    );

    f.render_widget(Clear, area);
    f.render_widget(dialog, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
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
        .split(vertical[1])[1]
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payment_dispatch::{Delivery, OutboxSender, OutgoingMessage, RosterConfig, SendError};
    use std::cell::RefCell;
    use std::fs::{self, File};
    use std::io::Write;
    use std::rc::Rc;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    struct SharedSender {
        sent: Rc<RefCell<Vec<String>>>,
        fail: bool,
    }

    impl MailSender for SharedSender {
        fn send(&self, message: &OutgoingMessage) -> Result<Delivery, SendError> {
            if self.fail {
                return Err(SendError::Transport("server unavailable".to_string()));
            }
            self.sent.borrow_mut().push(message.subject.clone());
            Ok(Delivery::Sent("smtp://test".to_string()))
        }
    }

    fn session_fixture() -> (TempDir, Session) {
        let dir = TempDir::new().unwrap();
        let roster = dir.path().join("r.csv");
        fs::write(&roster, "Razón Social,Mail\nACME,a@x.com\nBETA,b@y.com\n").unwrap();

        let archive = dir.path().join("a.zip");
        let mut zip = ZipWriter::new(File::create(&archive).unwrap());
        for name in ["2024-01-05 PAGO ACME.pdf", "2024-01-05 PAGO BETA.pdf"] {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(b"%PDF").unwrap();
        }
        zip.finish().unwrap();

        let session = Session::open(&roster, &archive, &RosterConfig::default()).unwrap();
        (dir, session)
    }

    fn app_with(fail: bool) -> (TempDir, App, Rc<RefCell<Vec<String>>>) {
        let (dir, session) = session_fixture();
        let sent = Rc::new(RefCell::new(Vec::new()));
        let sender = SharedSender {
            sent: Rc::clone(&sent),
            fail,
        };

        (dir, App::new(session, Box::new(sender)), sent)
    }

    #[test]
    fn test_send_requires_confirmation() {
        let (_dir, mut app, sent) = app_with(false);

        app.request_send();
        assert_eq!(app.confirming.as_deref(), Some("ACME"));
        assert!(sent.borrow().is_empty());

        app.confirm_yes();
        assert_eq!(*sent.borrow(), vec!["Pago ACME 05/01/2024".to_string()]);
        assert!(app.confirming.is_none());
        assert_eq!(app.stats().sent, 1);
        assert_eq!(
            app.message,
            Some(StatusMessage::Info(
                "Mail enviado a ACME correctamente (smtp://test).".to_string()
            ))
        );
    }

    #[test]
    fn test_outbox_reported_as_saved() {
        let (dir, session) = session_fixture();
        let outbox = OutboxSender::new("tesoreria@example.com".to_string(), dir.path().join("out"));
        let mut app = App::new(session, Box::new(outbox));

        app.request_send();
        app.confirm_yes();

        match &app.message {
            Some(StatusMessage::Info(msg)) => {
                assert!(msg.contains("guardado en outbox"));
                assert!(!msg.contains("enviado a"));
            }
            other => panic!("expected info message, got {:?}", other),
        }
        assert_eq!(app.stats().saved, 1);
        assert_eq!(app.stats().sent, 0);
    }

    #[test]
    fn test_decline_does_not_send() {
        let (_dir, mut app, sent) = app_with(false);

        app.next();
        app.request_send();
        app.confirm_no();

        assert!(sent.borrow().is_empty());
        assert_eq!(app.session.status("BETA"), Some(&DispatchStatus::Declined));
        assert_eq!(app.stats().declined, 1);
    }

    #[test]
    fn test_failure_shown_with_message() {
        let (_dir, mut app, _sent) = app_with(true);

        app.request_send();
        app.confirm_yes();

        match &app.message {
            Some(StatusMessage::Error(msg)) => assert!(msg.contains("server unavailable")),
            other => panic!("expected error message, got {:?}", other),
        }
        assert_eq!(app.stats().failed, 1);
        assert_eq!(app.stats().pending, 1);
    }

    #[test]
    fn test_navigation_wraps() {
        let (_dir, mut app, _sent) = app_with(false);

        app.previous();
        assert_eq!(app.selected_supplier().map(String::as_str), Some("BETA"));
        app.next();
        assert_eq!(app.selected_supplier().map(String::as_str), Some("ACME"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("ACME", 10), "ACME");
        assert_eq!(truncate("PROVEEDOR MUY LARGO", 10), "PROVEED...");
    }
}
