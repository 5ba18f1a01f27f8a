use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use chrono::Utc;
use std::io::stdout;
use std::time::Duration;
use tracing::debug;

use crate::driver::FeedDriver;
use crate::feed::{FeedController, FeedStatus};
use crate::filters::FilterCriteria;
use crate::models::{posted_ago, JobPosting, JobType, LocationType};
use crate::observer::{Sentinel, SentinelObserver};

const TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Search,
    Location,
}

struct Input {
    field: Field,
    buffer: String,
}

struct BrowseApp {
    feed: FeedController,
    observer: SentinelObserver,
    selected: usize,
    scroll_offset: u16,
    input: Option<Input>,
    list_rows: usize,
    // Sentinel that was on screen after the last frame
    sentinel_shown: Option<Sentinel>,
}

enum Action {
    None,
    Quit,
    Filters(FilterCriteria),
    LoadMore,
}

impl BrowseApp {
    fn new(feed: FeedController) -> Self {
        Self {
            feed,
            observer: SentinelObserver::new(),
            selected: 0,
            scroll_offset: 0,
            input: None,
            list_rows: 0,
            sentinel_shown: None,
        }
    }

    fn current_job(&self) -> Option<&JobPosting> {
        self.feed.items().get(self.selected)
    }

    fn next(&mut self) {
        let len = self.feed.items().len();
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    /// Re-attach the observer after the list changed and keep the selection in range.
    fn sync_after_render_change(&mut self) {
        if self.observer.retarget(self.feed.items()) {
            self.sentinel_shown = None;
        }
        let len = self.feed.items().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    /// The sentinel if the last row is inside the visible window.
    fn visible_sentinel(&self, list_state: &ListState) -> Option<Sentinel> {
        let last = self.feed.items().len().checked_sub(1)?;
        let first_visible = list_state.offset();
        if last >= first_visible && last < first_visible + self.list_rows {
            self.observer.sentinel()
        } else {
            None
        }
    }

    /// The sentinel, only on the frame it comes into view. A sentinel that
    /// stays visible (say, after a failed fetch) does not fire again.
    fn sentinel_entered(&mut self, list_state: &ListState) -> Option<Sentinel> {
        let visible = self.visible_sentinel(list_state);
        if visible == self.sentinel_shown {
            return None;
        }
        self.sentinel_shown = visible;
        visible
    }

    fn handle_key(&mut self, code: KeyCode) -> Action {
        if let Some(input) = self.input.as_mut() {
            match code {
                KeyCode::Esc => self.input = None,
                KeyCode::Enter => {
                    let mut next = self.feed.criteria().clone();
                    match input.field {
                        Field::Search => next.search = input.buffer.clone(),
                        Field::Location => next.location = input.buffer.clone(),
                    }
                    self.input = None;
                    return Action::Filters(next);
                }
                KeyCode::Backspace => {
                    input.buffer.pop();
                }
                KeyCode::Char(c) => input.buffer.push(c),
                _ => {}
            }
            return Action::None;
        }

        let criteria = self.feed.criteria().clone();
        match code {
            KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
            KeyCode::Down | KeyCode::Char('j') => {
                self.next();
                Action::None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.prev();
                Action::None
            }
            KeyCode::Char('J') | KeyCode::PageDown => {
                self.scroll_down();
                Action::None
            }
            KeyCode::Char('K') | KeyCode::PageUp => {
                self.scroll_up();
                Action::None
            }
            KeyCode::Char('/') => {
                self.input = Some(Input {
                    field: Field::Search,
                    buffer: criteria.search.clone(),
                });
                Action::None
            }
            KeyCode::Char('l') => {
                self.input = Some(Input {
                    field: Field::Location,
                    buffer: criteria.location.clone(),
                });
                Action::None
            }
            KeyCode::Char('t') => {
                let types = next_type_filter(&criteria.job_types.iter().copied().collect::<Vec<_>>());
                Action::Filters(criteria.clone().with_types(types))
            }
            KeyCode::Char('r') => {
                let remote = !criteria.remote;
                Action::Filters(criteria.clone().with_remote(remote))
            }
            KeyCode::Char('h') => {
                let hybrid = !criteria.hybrid;
                Action::Filters(criteria.clone().with_hybrid(hybrid))
            }
            KeyCode::Char('c') => Action::Filters(FilterCriteria::default()),
            KeyCode::Char('m') => Action::LoadMore,
            _ => Action::None,
        }
    }
}

/// Cycle: all types -> each single type in turn -> all types.
fn next_type_filter(current: &[JobType]) -> Vec<JobType> {
    match current {
        [] => vec![JobType::ALL[0]],
        [only] => JobType::ALL
            .iter()
            .position(|t| t == only)
            .and_then(|i| JobType::ALL.get(i + 1))
            .map(|t| vec![*t])
            .unwrap_or_default(),
        _ => vec![],
    }
}

pub fn run_browse(feed: FeedController, mut driver: FeedDriver) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let _guard = runtime.enter();

    let mut app = BrowseApp::new(feed);
    driver.dispatch(app.feed.mount());

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut app, &mut driver);
    app.observer.detach();
    if driver.in_flight() > 0 {
        debug!(in_flight = driver.in_flight(), "leaving with fetches in flight");
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app: &mut BrowseApp,
    driver: &mut FeedDriver,
) -> Result<()> {
    let mut list_state = ListState::default();

    loop {
        if driver.drain_ready(&mut app.feed) > 0 {
            app.sync_after_render_change();
        }
        list_state.select(if app.feed.items().is_empty() {
            None
        } else {
            Some(app.selected)
        });

        terminal.draw(|frame| draw(frame, app, &mut list_state))?;

        if let Some(sentinel) = app.sentinel_entered(&list_state) {
            driver.dispatch(app.observer.intersect(sentinel, &mut app.feed));
        }

        if !event::poll(TICK)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match app.handle_key(key.code) {
                Action::Quit => break,
                Action::Filters(next) => {
                    driver.dispatch(app.feed.set_filters(next));
                    app.selected = 0;
                    app.scroll_offset = 0;
                    app.sync_after_render_change();
                    *list_state.offset_mut() = 0;
                }
                Action::LoadMore => driver.dispatch(app.feed.load_more()),
                Action::None => {}
            }
        }
    }
    Ok(())
}

fn draw(frame: &mut Frame, app: &mut BrowseApp, list_state: &mut ListState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[0]);

    // Left panel: job list
    let mut items: Vec<ListItem> = app
        .feed
        .items()
        .iter()
        .map(|job| {
            let badge = match job.location_type {
                LocationType::Remote => "R",
                LocationType::Hybrid => "H",
                LocationType::Onsite => " ",
            };
            let title = truncate(&job.title, 32);
            ListItem::new(format!("{} {} | {}", badge, title, job.company_name))
        })
        .collect();
    items.push(status_row(&app.feed));

    // Rows available inside the borders, minus the status row
    app.list_rows = chunks[0].height.saturating_sub(3) as usize;

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            " Jobs ({}) · {} ",
            app.feed.items().len(),
            app.feed.criteria().describe()
        )))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: job detail
    let detail = Paragraph::new(build_detail(app))
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((app.scroll_offset, 0));
    frame.render_widget(detail, chunks[1]);

    // Footer: input line or help
    let footer = match &app.input {
        Some(input) => {
            let label = match input.field {
                Field::Search => "Search",
                Field::Location => "Location",
            };
            Paragraph::new(format!(" {}: {}_  (enter: apply, esc: cancel)", label, input.buffer))
                .style(Style::default().fg(Color::Yellow))
        }
        None => Paragraph::new(
            " j/k:navigate  J/K:scroll  /:search l:location t:type r:remote h:hybrid c:clear  m:more  q:quit",
        )
        .style(Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(footer, rows[1]);
}

fn status_row(feed: &FeedController) -> ListItem<'static> {
    let (text, style) = status_line(feed);
    ListItem::new(text).style(style)
}

fn status_line(feed: &FeedController) -> (String, Style) {
    match feed.status() {
        FeedStatus::Loading => ("  Loading jobs...".to_string(), Style::default().fg(Color::Yellow)),
        FeedStatus::Failed => (
            format!(
                "  {}",
                feed.error().map(|e| e.user_message()).unwrap_or("Failed")
            ),
            Style::default().fg(Color::Red),
        ),
        FeedStatus::Empty if feed.criteria().is_unconstrained() => (
            "  No jobs posted yet.".to_string(),
            Style::default().fg(Color::DarkGray),
        ),
        FeedStatus::Empty => (
            "  No jobs found matching your criteria. Press c to clear filters.".to_string(),
            Style::default().fg(Color::DarkGray),
        ),
        FeedStatus::Exhausted => ("  End of results".to_string(), Style::default().fg(Color::DarkGray)),
        FeedStatus::Ready => ("  Press m to load more jobs".to_string(), Style::default().fg(Color::DarkGray)),
    }
}

fn build_detail(app: &BrowseApp) -> Text<'_> {
    let Some(job) = app.current_job() else {
        return Text::raw("No job selected");
    };

    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(Span::styled(
        &job.title,
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(Span::styled(
        &job.company_name,
        Style::default().fg(Color::Cyan),
    )));
    lines.push(Line::from(""));
    lines.push(Line::from(format!("Location: {}", job.location_label())));
    lines.push(Line::from(format!("Type:     {}", job.job_type.label())));
    lines.push(Line::from(format!("Salary:   {}", job.salary.display())));
    lines.push(Line::from(format!("Posted:   {}", posted_ago(&job.created_at, Utc::now()))));
    lines.push(Line::from(""));

    lines.push(Line::from(Span::styled(
        "Description",
        Style::default().add_modifier(Modifier::BOLD),
    )));
    for line in textwrap::fill(&job.description, 70).lines() {
        lines.push(Line::from(line.to_string()));
    }

    for (label, entries) in [("Requirements", &job.requirements), ("Benefits", &job.benefits)] {
        if entries.is_empty() {
            continue;
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            label,
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for entry in entries {
            lines.push(Line::from(format!("  + {}", entry)));
        }
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!("jobboard show {}  ·  jobboard apply {} --resume <file>", job.id, job.id),
        Style::default().fg(Color::DarkGray),
    )));

    Text::from(lines)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
