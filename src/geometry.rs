//! Screen rectangles for the launcher bar and the tool windows below it
//!
//! The launcher hands each tool the area under the bar through four
//! environment variables. Tools read them back with [`WindowGeometry::from_env`].

pub const ENV_WINDOW_X: &str = "TOOL_WINDOW_X";
pub const ENV_WINDOW_Y: &str = "TOOL_WINDOW_Y";
pub const ENV_WINDOW_WIDTH: &str = "TOOL_WINDOW_WIDTH";
pub const ENV_WINDOW_HEIGHT: &str = "TOOL_WINDOW_HEIGHT";

/// Tool areas shorter than this are reported as cramped
pub const MIN_USABLE_HEIGHT: u32 = 400;

/// Display size assumed when the platform cannot report one
pub const FALLBACK_DISPLAY: Rect = Rect {
    x: 0,
    y: 0,
    width: 1920,
    height: 1080,
};

/// Rectangle in screen pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Rect { x, y, width, height }
    }

    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Move and shrink `self` until it lies inside `bounds`
    pub fn clamp_within(&self, bounds: &Rect) -> Rect {
        let width = self.width.min(bounds.width);
        let height = self.height.min(bounds.height);

        let max_x = bounds.right() - width as i64;
        let max_y = bounds.bottom() - height as i64;
        let x = (self.x as i64).clamp(bounds.x as i64, max_x);
        let y = (self.y as i64).clamp(bounds.y as i64, max_y);

        Rect {
            x: x as i32,
            y: y as i32,
            width,
            height,
        }
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Parse `1920x1080`
    pub fn parse_size(value: &str) -> Option<Rect> {
        let (width, height) = value.trim().split_once(['x', 'X'])?;
        Some(Rect::new(0, 0, width.parse().ok()?, height.parse().ok()?))
    }
}

/// Screen area a tool window should occupy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowGeometry {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// The four `TOOL_WINDOW_*` variables for a child process environment
    pub fn env_vars(&self) -> [(&'static str, String); 4] {
        [
            (ENV_WINDOW_X, self.x.to_string()),
            (ENV_WINDOW_Y, self.y.to_string()),
            (ENV_WINDOW_WIDTH, self.width.to_string()),
            (ENV_WINDOW_HEIGHT, self.height.to_string()),
        ]
    }

    /// Read the geometry a launcher passed down. `None` when the tool was
    /// started on its own or a value is not an integer.
    pub fn from_env<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string());

        Some(WindowGeometry {
            x: read(ENV_WINDOW_X)?.parse().ok()?,
            y: read(ENV_WINDOW_Y)?.parse().ok()?,
            width: read(ENV_WINDOW_WIDTH)?.parse().ok()?,
            height: read(ENV_WINDOW_HEIGHT)?.parse().ok()?,
        })
    }

    /// Less room than [`MIN_USABLE_HEIGHT`] below the bar
    pub fn is_cramped(&self) -> bool {
        self.height < MIN_USABLE_HEIGHT
    }

    /// `WIDTHxHEIGHT+X+Y`, the form most toolkits accept for initial placement
    pub fn placement_string(&self) -> String {
        format!("{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Compute the tool area below the launcher bar.
///
/// The tool area spans the full display width and runs from the bar's
/// bottom edge to the display's bottom edge. A bar placed so low that less
/// than [`MIN_USABLE_HEIGHT`] remains yields a cramped area rather than one
/// that leaves the display or overlaps the bar.
pub fn allocate(bar: &Rect, display: &Rect) -> WindowGeometry {
    let bar = bar.clamp_within(display);
    let available = (display.bottom() - bar.bottom()).max(0) as u32;

    if available < MIN_USABLE_HEIGHT {
        tracing::debug!(
            "Only {}px below the launcher bar, less than the usable minimum of {}px",
            available,
            MIN_USABLE_HEIGHT
        );
    }

    WindowGeometry {
        x: display.x,
        y: bar.bottom() as i32,
        width: display.width,
        height: available,
    }
}

/// Bounds of the primary display
#[cfg(windows)]
pub fn primary_display() -> Rect {
    use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

    let (width, height) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
    if width <= 0 || height <= 0 {
        tracing::warn!("GetSystemMetrics returned {}x{}, using fallback display", width, height);
        return FALLBACK_DISPLAY;
    }
    Rect::new(0, 0, width as u32, height as u32)
}

#[cfg(not(windows))]
pub fn primary_display() -> Rect {
    FALLBACK_DISPLAY
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_full_width_bar_at_top() {
        let bar = Rect::new(0, 0, 1920, 40);
        let display = Rect::new(0, 0, 1920, 1080);

        let geometry = allocate(&bar, &display);
        assert_eq!(
            geometry,
            WindowGeometry {
                x: 0,
                y: 40,
                width: 1920,
                height: 1040
            }
        );
    }

    #[test]
    fn test_inset_bar() {
        let bar = Rect::new(10, 10, 1900, 70);
        let display = Rect::new(0, 0, 1920, 1080);

        let geometry = allocate(&bar, &display);
        assert_eq!(geometry.y, 80);
        assert_eq!(geometry.height, 1000);
        assert!(display.contains(&geometry.rect()));
    }

    #[test]
    fn test_bar_near_bottom_stays_on_screen() {
        let display = Rect::new(0, 0, 1920, 1080);

        for y in [600, 900, 1010, 1040] {
            let bar = Rect::new(0, y, 1920, 40);
            let geometry = allocate(&bar, &display);
            assert!(geometry.y as i64 >= bar.bottom());
            assert!(display.contains(&geometry.rect()), "bar at y={}", y);
        }

        let low = allocate(&Rect::new(0, 900, 1920, 40), &display);
        assert!(low.is_cramped());
        assert!(!allocate(&Rect::new(0, 0, 1920, 40), &display).is_cramped());
    }

    #[test]
    fn test_bar_positions_never_produce_overlap() {
        let display = Rect::new(-1280, 0, 1280, 1024);

        for y in (0..1024).step_by(97) {
            for height in [20u32, 70, 300] {
                let bar = Rect::new(-1200, y, 800, height);
                if !display.contains(&bar) {
                    continue;
                }
                let geometry = allocate(&bar, &display);
                assert!(geometry.y as i64 >= bar.bottom());
                assert!(display.contains(&geometry.rect()));
            }
        }
    }

    #[test]
    fn test_bar_outside_display_is_clamped() {
        let bar = Rect::new(5000, -300, 400, 70);
        let display = Rect::new(0, 0, 1920, 1080);

        let geometry = allocate(&bar, &display);
        assert_eq!(geometry.y, 70);
        assert_eq!(geometry.height, 1010);
    }

    #[test]
    fn test_env_vars_round_trip() {
        let geometry = WindowGeometry {
            x: 10,
            y: 130,
            width: 1900,
            height: 890,
        };

        let env: HashMap<String, String> = geometry
            .env_vars()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        assert_eq!(env.get("TOOL_WINDOW_Y").map(String::as_str), Some("130"));
        assert_eq!(WindowGeometry::from_env(|k| env.get(k).cloned()), Some(geometry));
    }

    #[test]
    fn test_from_env_missing_or_invalid() {
        assert_eq!(WindowGeometry::from_env(|_| None), None);
        assert_eq!(
            WindowGeometry::from_env(|_| Some("wide".to_string())),
            None
        );
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(Rect::parse_size("2560x1440"), Some(Rect::new(0, 0, 2560, 1440)));
        assert_eq!(Rect::parse_size("2560"), None);
    }
}
