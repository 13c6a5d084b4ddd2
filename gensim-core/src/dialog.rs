//! Dialog text: the seam to whatever produces the prose shown for an effect.
//!
//! Rendering is not the kernel's job. Effects carry candidate lines, and a
//! [`DialogSource`] picks one when the effect commits. The default source
//! chooses a line at random, which is how repeated events stay varied.

use rand::seq::SliceRandom;
use rand::RngCore;

use crate::effect::Effect;

/// Produces the text attached to a committed effect.
pub trait DialogSource {
    /// Text for `effect`; empty when there is nothing to show.
    fn line(&self, effect: &Effect, rng: &mut dyn RngCore) -> String;
}

/// Picks one of the effect's own dialog lines at random.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomLine;

impl DialogSource for RandomLine {
    fn line(&self, effect: &Effect, rng: &mut dyn RngCore) -> String {
        effect.dialog.choose(rng).cloned().unwrap_or_default()
    }
}

/// Never produces text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl DialogSource for Silent {
    fn line(&self, _effect: &Effect, _rng: &mut dyn RngCore) -> String {
        String::new()
    }
}

/// Replace `{name}` placeholders with the given variables.
///
/// Unknown placeholders are left untouched and the result is trimmed.
#[must_use]
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut text = template.to_string();
    for (name, value) in vars {
        text = text.replace(&format!("{{{name}}}"), value);
    }
    text.trim().to_string()
}

/// Split an authored dialog file into chunks separated by `***`.
#[must_use]
pub fn chunks(source: &str) -> Vec<String> {
    source
        .split("***")
        .map(|chunk| chunk.trim().to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn render_substitutes_player() {
        assert_eq!(render("  {player}  ", &[("player", "Anon")]), "Anon");
        assert_eq!(
            render("Hello {player}, I am {who}.", &[("player", "Anon")]),
            "Hello Anon, I am {who}."
        );
    }

    #[test]
    fn chunks_split_on_separator() {
        let parts = chunks("first line\n***\nsecond line\n***\n");
        assert_eq!(parts, vec!["first line".to_string(), "second line".to_string()]);
    }

    #[test]
    fn random_line_picks_from_effect() {
        let mut effect = Effect::placeholder();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(RandomLine.line(&effect, &mut rng), "");

        effect.dialog = vec!["...Execution".to_string()];
        assert_eq!(RandomLine.line(&effect, &mut rng), "...Execution");
        assert_eq!(Silent.line(&effect, &mut rng), "");
    }
}
