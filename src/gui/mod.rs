/// ICED launcher bar
///
/// Architecture:
/// - A slim always-on-top bar across the top of the primary display
/// - Tool buttons grouped by category, plus log and settings panels that
///   expand the bar downwards
/// - Tool output is drained from `LauncherState` on a 100ms tick
mod config_editor;

pub use config_editor::{ConfigMessage, EditingConfig};

use crate::dialogs;
use crate::discovery::group_by_category;
use crate::geometry::Rect;
use crate::launcher::{LauncherState, BAR_HEIGHT};
use crate::process::DEFAULT_GRACE_PERIOD;
use iced::{
    event, executor,
    widget::{scrollable, Button, Column, Container, Row, Scrollable, Space, Text},
    window, Alignment, Application, Color, Command, Element, Event, Length, Point, Settings,
    Size, Subscription, Theme,
};
use std::time::{Duration, Instant};

/// Bar height while a panel is open
pub const EXPANDED_HEIGHT: u32 = 300;
/// How often tool output is polled
pub const OUTPUT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Lines shown in the log panel
const LOG_VIEW_LINES: usize = 500;
const STATUS_TIMEOUT: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Log,
    Settings,
}

#[derive(Debug, Clone)]
pub enum Message {
    Launch(usize),
    Refresh,
    CloseAll,
    TogglePanel(Panel),
    ClearLog,

    // Settings panel
    Config(ConfigMessage),
    SaveConfig,
    OpenConfigFolder,

    // Window events
    BarMoved { x: i32, y: i32 },
    BarResized { width: u32, height: u32 },
    ExitRequested,

    Tick,
}

/// Status text that falls back to the tool count after a few seconds
struct StatusLine {
    message: Option<(String, Instant)>,
}

impl StatusLine {
    fn set(&mut self, message: impl Into<String>) {
        self.message = Some((message.into(), Instant::now()));
    }

    fn expire(&mut self) {
        if let Some((_, since)) = &self.message {
            if since.elapsed() >= STATUS_TIMEOUT {
                self.message = None;
            }
        }
    }

    fn text(&self, tool_count: usize, running: usize) -> String {
        match &self.message {
            Some((message, _)) => message.clone(),
            None if running > 0 => format!("{} tools, {} running", tool_count, running),
            None => format!("{} tools available", tool_count),
        }
    }
}

pub struct LauncherFlags {
    pub state: LauncherState,
}

pub struct LauncherBar {
    state: LauncherState,
    panel: Option<Panel>,
    editing: EditingConfig,
    status: StatusLine,
}

impl LauncherBar {
    fn bar_size(&self) -> Size {
        let height = if self.panel.is_some() {
            EXPANDED_HEIGHT
        } else {
            BAR_HEIGHT
        };
        Size::new(self.state.bar().width as f32, height as f32)
    }

    fn launch(&mut self, index: usize) {
        let Some(tool) = self.state.tools().get(index).cloned() else {
            return;
        };

        if self.state.is_tool_running(index)
            && !dialogs::confirm_another_instance(&tool.display_name)
        {
            return;
        }

        match self.state.launch(index) {
            Ok(_) => self.status.set(format!("Launched: {}", tool.display_name)),
            Err(e) => {
                self.status.set(format!("Failed: {}", tool.display_name));
                dialogs::show_error(&e);
            }
        }
    }

    fn close_all(&mut self) {
        let report = self.state.close_all(DEFAULT_GRACE_PERIOD);
        let closed = report.closed_count();
        if closed == 0 {
            self.status.set("No tools running");
        } else {
            self.status.set(format!("Closed {} tool(s)", closed));
        }
    }

    fn save_config(&mut self) {
        let config = self.editing.apply_to(self.state.config().clone());
        match self.state.update_config(config) {
            Ok(()) => {
                tracing::info!("Configuration saved to {}", self.state.config_store().path().display());
                self.status.set("Configuration saved");
            }
            Err(e) => {
                self.status.set("Failed to save configuration");
                dialogs::show_error(&e);
            }
        }
    }

    fn exit(&mut self) -> Command<Message> {
        let running = self.state.registry().running_count();
        if !dialogs::confirm_exit(running) {
            return Command::none();
        }

        match self.state.shutdown(DEFAULT_GRACE_PERIOD) {
            Ok(report) => tracing::info!(
                "Closed {} tools on exit ({} already exited)",
                report.closed_count(),
                report.already_exited.len()
            ),
            Err(e) => tracing::error!("Shutdown failed: {}", e),
        }
        window::close(window::Id::MAIN)
    }

    fn view_tools(&self) -> Element<'_, Message> {
        let tools = self.state.tools();
        if tools.is_empty() {
            return Text::new(format!(
                "No launch scripts found in {}",
                self.state.root_dir().display()
            ))
            .size(13)
            .into();
        }

        let mut groups = Row::new().spacing(16).align_items(Alignment::End);
        for (category, members) in group_by_category(tools) {
            let mut buttons = Row::new().spacing(4);
            for tool in members {
                let label = if self.state.registry().is_running(&tool.name) {
                    format!("{} ●", tool.button_label())
                } else {
                    tool.button_label()
                };
                buttons = buttons.push(
                    Button::new(Text::new(label).size(13))
                        .on_press(Message::Launch(tool.discovered_at))
                        .padding([4, 8]),
                );
            }

            groups = groups.push(
                Column::new()
                    .spacing(2)
                    .push(Text::new(category.to_string()).size(10))
                    .push(buttons),
            );
        }

        Scrollable::new(groups)
            .direction(scrollable::Direction::Horizontal(
                scrollable::Properties::default(),
            ))
            .width(Length::Fill)
            .into()
    }

    fn view_controls(&self) -> Element<'_, Message> {
        let log_label = if self.panel == Some(Panel::Log) {
            "📋 Hide Log"
        } else {
            "📋 Log"
        };
        let settings_label = if self.panel == Some(Panel::Settings) {
            "⚙ Hide Settings"
        } else {
            "⚙ Settings"
        };

        Row::new()
            .spacing(4)
            .align_items(Alignment::Center)
            .push(Button::new(Text::new("🔄").size(13)).on_press(Message::Refresh))
            .push(Button::new(Text::new("Close All").size(13)).on_press(Message::CloseAll))
            .push(
                Button::new(Text::new(log_label).size(13))
                    .on_press(Message::TogglePanel(Panel::Log)),
            )
            .push(
                Button::new(Text::new(settings_label).size(13))
                    .on_press(Message::TogglePanel(Panel::Settings)),
            )
            .push(Button::new(Text::new("✕ Exit").size(13)).on_press(Message::ExitRequested))
            .into()
    }

    fn view_log(&self) -> Element<'_, Message> {
        let mut lines = Column::new().spacing(1);
        for entry in self.state.log().tail(LOG_VIEW_LINES) {
            let text = Text::new(entry.format_line()).size(12);
            lines = lines.push(if entry.is_error() {
                text.style(Color::from_rgb(0.9, 0.35, 0.35))
            } else {
                text
            });
        }

        let header = Row::new()
            .spacing(10)
            .align_items(Alignment::Center)
            .push(Text::new("Tool Output").size(14))
            .push(Space::with_width(Length::Fill))
            .push(Button::new(Text::new("Clear").size(12)).on_press(Message::ClearLog));

        Column::new()
            .spacing(6)
            .padding(6)
            .push(header)
            .push(
                Scrollable::new(lines)
                    .height(Length::Fill)
                    .width(Length::Fill),
            )
            .into()
    }
}

impl Application for LauncherBar {
    type Executor = executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = LauncherFlags;

    fn new(flags: LauncherFlags) -> (Self, Command<Message>) {
        let editing = EditingConfig::from(flags.state.config());
        let bar = LauncherBar {
            state: flags.state,
            panel: None,
            editing,
            status: StatusLine { message: None },
        };
        (bar, Command::none())
    }

    fn title(&self) -> String {
        String::from("PDF Toolbox")
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }

    fn subscription(&self) -> Subscription<Message> {
        struct OutputPoller;

        let tick = iced::subscription::unfold(std::any::TypeId::of::<OutputPoller>(), (), |_| async move {
            std::thread::sleep(OUTPUT_POLL_INTERVAL);
            (Message::Tick, ())
        });

        let window_events = event::listen_with(|event, _status| match event {
            Event::Window(_, window::Event::Moved { x, y }) => Some(Message::BarMoved { x, y }),
            Event::Window(_, window::Event::Resized { width, height }) => {
                Some(Message::BarResized { width, height })
            }
            Event::Window(_, window::Event::CloseRequested) => Some(Message::ExitRequested),
            _ => None,
        });

        Subscription::batch([tick, window_events])
    }

    fn update(&mut self, message: Message) -> Command<Message> {
        match message {
            Message::Launch(index) => self.launch(index),
            Message::Refresh => {
                self.state.refresh_tools();
                self.status
                    .set(format!("Found {} tools", self.state.tools().len()));
            }
            Message::CloseAll => self.close_all(),
            Message::TogglePanel(panel) => {
                if self.panel == Some(panel) {
                    self.panel = None;
                } else {
                    if panel == Panel::Settings {
                        self.editing = EditingConfig::from(self.state.config());
                    }
                    self.panel = Some(panel);
                }
                return window::resize(window::Id::MAIN, self.bar_size());
            }
            Message::ClearLog => self.state.clear_log(),
            Message::Config(change) => self.editing.update(change),
            Message::SaveConfig => self.save_config(),
            Message::OpenConfigFolder => {
                let dir = self.state.config_store().directory().to_path_buf();
                if let Err(e) = dialogs::open_folder(&dir) {
                    tracing::warn!("{:#}", e);
                    self.status.set("Could not open config folder");
                }
            }
            Message::BarMoved { x, y } => {
                let bar = self.state.bar();
                self.state.set_bar_rect(Rect::new(x, y, bar.width, bar.height));
            }
            Message::BarResized { width, height } => {
                let bar = self.state.bar();
                self.state.set_bar_rect(Rect::new(bar.x, bar.y, width, height));
            }
            Message::ExitRequested => return self.exit(),
            Message::Tick => {
                for tool in self.state.poll() {
                    tracing::debug!("{} exited with {:?}", tool.tool_name, tool.exit_code);
                }
                self.status.expire();
            }
        }

        Command::none()
    }

    fn view(&self) -> Element<'_, Message> {
        let status = self.status.text(
            self.state.tools().len(),
            self.state.registry().running_count(),
        );

        let bar = Row::new()
            .spacing(12)
            .padding(6)
            .height(Length::Fixed(BAR_HEIGHT as f32))
            .align_items(Alignment::Center)
            .push(Text::new("📄 PDF Toolbox").size(16))
            .push(self.view_tools())
            .push(Text::new(status).size(12))
            .push(self.view_controls());

        let mut content = Column::new().push(bar);
        match self.panel {
            Some(Panel::Log) => content = content.push(self.view_log()),
            Some(Panel::Settings) => {
                content = content.push(Scrollable::new(config_editor::render_editor(
                    &self.editing,
                    &self.state.config().status_text(),
                )))
            }
            None => {}
        }

        Container::new(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }
}

/// Open the launcher bar at the top of the display and block until it closes
pub fn run(state: LauncherState) -> iced::Result {
    let bar = state.bar();
    tracing::info!("Opening launcher bar at {:?}", bar);

    LauncherBar::run(Settings {
        window: window::Settings {
            size: Size::new(bar.width as f32, BAR_HEIGHT as f32),
            position: window::Position::Specific(Point::new(bar.x as f32, bar.y as f32)),
            level: window::Level::AlwaysOnTop,
            exit_on_close_request: false,
            ..Default::default()
        },
        ..Settings::with_flags(LauncherFlags { state })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line_falls_back_to_counts() {
        let mut status = StatusLine { message: None };
        assert_eq!(status.text(4, 0), "4 tools available");
        assert_eq!(status.text(4, 2), "4 tools, 2 running");

        status.set("Launched: PDF OCR");
        status.expire();
        assert_eq!(status.text(4, 0), "Launched: PDF OCR");

        status.message = Some(("old".to_string(), Instant::now() - STATUS_TIMEOUT));
        status.expire();
        assert_eq!(status.text(1, 0), "1 tools available");
    }
}
