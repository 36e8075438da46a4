use crate::composite::{BlurLevel, CompositeMode, CompositeParameters};
use anyhow::Result;
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;

/// What the pipeline reads at the start of each cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlState {
    pub params: CompositeParameters,
    /// Bumped on every real mode change; the pipeline reloads the model when it moves
    pub model_epoch: u64,
}

/// One operator command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Blur(BlurLevel),
    SetBackground(u32),
    Quit,
}

impl FromStr for Control {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut words = s.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();
        let control = match command.as_str() {
            "none" | "no" | "off" => Control::Blur(BlurLevel::None),
            "low" => Control::Blur(BlurLevel::Low),
            "med" | "medium" => Control::Blur(BlurLevel::Medium),
            "high" => Control::Blur(BlurLevel::High),
            "bg" | "background" => {
                let id = words
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("`{command}` needs a background id"))?;
                Control::SetBackground(id.parse()?)
            }
            "quit" | "q" | "exit" => Control::Quit,
            "" => anyhow::bail!("empty command"),
            other => anyhow::bail!("unknown command `{other}` (none|low|med|high|bg <id>|quit)"),
        };
        Ok(control)
    }
}

/// Write side of the pipeline's parameters and stop signal
pub struct Controls {
    state: watch::Sender<ControlState>,
    stop: watch::Sender<bool>,
}

impl Controls {
    pub fn new(initial: CompositeParameters) -> Self {
        let (state, _) = watch::channel(ControlState {
            params: initial,
            model_epoch: 0,
        });
        let (stop, _) = watch::channel(false);
        Self { state, stop }
    }

    pub fn subscribe(&self) -> watch::Receiver<ControlState> {
        self.state.subscribe()
    }

    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }

    pub fn current(&self) -> ControlState {
        *self.state.borrow()
    }

    pub fn no_blur(&self) {
        self.set_blur(BlurLevel::None);
    }

    pub fn low_blur(&self) {
        self.set_blur(BlurLevel::Low);
    }

    pub fn medium_blur(&self) {
        self.set_blur(BlurLevel::Medium);
    }

    pub fn high_blur(&self) {
        self.set_blur(BlurLevel::High);
    }

    fn set_blur(&self, level: BlurLevel) {
        self.update(CompositeMode::Blur, |params| params.blur_amount = level.amount());
        tracing::info!("Blur level {:?} ({})", level, level.amount());
    }

    pub fn set_background(&self, id: u32) {
        self.update(CompositeMode::Image, |params| params.background_image_id = Some(id));
        tracing::info!("Background image {}", id);
    }

    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn apply(&self, control: Control) {
        match control {
            Control::Blur(BlurLevel::None) => self.no_blur(),
            Control::Blur(BlurLevel::Low) => self.low_blur(),
            Control::Blur(BlurLevel::Medium) => self.medium_blur(),
            Control::Blur(BlurLevel::High) => self.high_blur(),
            Control::SetBackground(id) => self.set_background(id),
            Control::Quit => self.stop(),
        }
    }

    fn update(&self, mode: CompositeMode, change: impl FnOnce(&mut CompositeParameters)) {
        self.state.send_modify(|state| {
            if state.params.mode != mode {
                tracing::info!("Switching mode {:?} -> {:?}", state.params.mode, mode);
                state.params.mode = mode;
                state.model_epoch += 1;
            }
            change(&mut state.params);
        });
    }

    /// Feed commands from `input`, one per line, until EOF or `quit`.
    ///
    /// EOF leaves the pipeline running with the last parameters; only `quit` stops it.
    pub async fn run_commands<R>(&self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Control>() {
                Ok(control) => {
                    self.apply(control);
                    if control == Control::Quit {
                        break;
                    }
                }
                Err(err) => tracing::warn!("{}", err),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("none", Control::Blur(BlurLevel::None))]
    #[case("low", Control::Blur(BlurLevel::Low))]
    #[case("MED", Control::Blur(BlurLevel::Medium))]
    #[case("high", Control::Blur(BlurLevel::High))]
    #[case("bg 2", Control::SetBackground(2))]
    #[case("  background   7 ", Control::SetBackground(7))]
    #[case("quit", Control::Quit)]
    fn parses_commands(#[case] input: &str, #[case] expected: Control) {
        assert_eq!(input.parse::<Control>().unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("bg")]
    #[case("bg two")]
    #[case("sepia")]
    fn rejects_bad_commands(#[case] input: &str) {
        assert!(input.parse::<Control>().is_err());
    }

    #[rstest]
    #[case(BlurLevel::None, 0)]
    #[case(BlurLevel::Low, 3)]
    #[case(BlurLevel::Medium, 5)]
    #[case(BlurLevel::High, 10)]
    fn blur_setters_use_fixed_levels(#[case] level: BlurLevel, #[case] amount: u32) {
        let controls = Controls::new(CompositeParameters::default());
        controls.apply(Control::Blur(level));
        assert_eq!(controls.current().params.blur_amount, amount);
        assert_eq!(controls.current().model_epoch, 0);
    }

    #[test]
    fn only_real_mode_changes_bump_the_epoch() {
        let controls = Controls::new(CompositeParameters::default());

        controls.high_blur();
        controls.high_blur();
        controls.low_blur();
        assert_eq!(controls.current().model_epoch, 0);

        controls.set_background(2);
        let state = controls.current();
        assert_eq!(state.model_epoch, 1);
        assert_eq!(state.params.mode, CompositeMode::Image);
        assert_eq!(state.params.background_image_id, Some(2));

        controls.set_background(3);
        assert_eq!(controls.current().model_epoch, 1);

        controls.medium_blur();
        let state = controls.current();
        assert_eq!(state.model_epoch, 2);
        assert_eq!(state.params.mode, CompositeMode::Blur);
        assert_eq!(state.params.blur_amount, 5);
    }

    #[test]
    fn switching_back_keeps_blur_level_of_the_setter() {
        let controls = Controls::new(CompositeParameters::default());
        controls.high_blur();
        controls.set_background(1);
        controls.no_blur();
        assert_eq!(controls.current().params.blur_amount, 0);
    }

    #[tokio::test]
    async fn commands_drive_state_and_stop() {
        let controls = Controls::new(CompositeParameters::default());
        let stop = controls.stop_signal();
        let input: &[u8] = b"low\nnonsense\n\nbg 4\nquit\nhigh\n";

        controls.run_commands(input).await.unwrap();

        let state = controls.current();
        assert_eq!(state.params.mode, CompositeMode::Image);
        assert_eq!(state.params.blur_amount, 3);
        assert_eq!(state.params.background_image_id, Some(4));
        assert!(*stop.borrow());
    }

    #[tokio::test]
    async fn eof_does_not_stop() {
        let controls = Controls::new(CompositeParameters::default());
        let stop = controls.stop_signal();
        let input: &[u8] = b"high\n";

        controls.run_commands(input).await.unwrap();

        assert_eq!(controls.current().params.blur_amount, 10);
        assert!(!*stop.borrow());
    }
}
