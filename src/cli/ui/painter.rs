use owo_colors::{OwoColorize, Style as OwoStyle};

const LOW_BATTERY: u8 = 20;
const HEALTHY_BATTERY: u8 = 50;

/// Applies colour and style to terminal text.
#[derive(Debug)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    /// Creates a painter with explicit colour control.
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn heading<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().cyan())
    }

    pub(crate) fn success<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().green())
    }

    pub(crate) fn warning<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().yellow())
    }

    pub(crate) fn danger<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().red())
    }

    pub(crate) fn muted<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().dimmed())
    }

    pub(crate) fn value<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold())
    }

    /// `yes` in green or `no` dimmed.
    pub(crate) fn flag(&self, set: bool) -> String {
        if set {
            self.success("yes")
        } else {
            self.muted("no")
        }
    }

    /// Battery percentage coloured by charge level.
    pub(crate) fn battery(&self, level: u8) -> String {
        let text = format!("{level}%");
        match level {
            level if level < LOW_BATTERY => self.danger(text),
            level if level < HEALTHY_BATTERY => self.warning(text),
            _ => self.success(text),
        }
    }

    fn paint(&self, text: &str, style: OwoStyle) -> String {
        if self.use_colour {
            format!("{}", text.style(style))
        } else {
            text.to_string()
        }
    }
}
