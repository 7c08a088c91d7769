pub mod session;
#[cfg(feature = "server")]
pub mod serve;
pub mod spans;

use colored::Colorize;

/// Serialize a value as pretty-printed JSON and print it to stdout.
fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize JSON output: {e}"))?;
    println!("{json}");
    Ok(())
}

/// Format line stats as colored "+N -M" string.
fn format_line_stats(added: u32, removed: u32) -> String {
    match (added, removed) {
        (0, 0) => String::new(),
        (a, 0) => format!("{}", format!("+{a}").green()),
        (0, r) => format!("{}", format!("-{r}").red()),
        (a, r) => format!("{} {}", format!("+{a}").green(), format!("-{r}").red()),
    }
}
