//! `narragraph providers`: List the predefined LLM providers.

use narragraph_config::provider_env_var;
use narragraph_providers::{ProviderProfile, StructuredOutput, profile::all_profiles};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🤖 Predefined LLM Providers");
    println!("===========================");
    println!();
    print!("{}", render_table(all_profiles()));
    println!();
    println!("  Select one with `default_provider` in ~/.narragraph/config.toml,");
    println!("  NARRAGRAPH_PROVIDER, or `narragraph extract --provider <id>`.");
    println!("  Endpoints can be replaced per provider:");
    println!("    [providers.openai]");
    println!("    api_url = \"https://your-custom-endpoint.com/v1\"");

    Ok(())
}

fn structured_label(profile: &ProviderProfile) -> &'static str {
    match profile.structured_output {
        StructuredOutput::NativeSchema => "json_schema",
        StructuredOutput::PromptInstruction if profile.answers_in_prose => "prompt+prose",
        StructuredOutput::PromptInstruction => "prompt",
    }
}

fn render_table<'a>(profiles: impl Iterator<Item = &'a ProviderProfile>) -> String {
    let rows: Vec<[String; 6]> = profiles
        .map(|p| {
            [
                p.id.to_string(),
                p.base_url.to_string(),
                p.default_model.to_string(),
                format!("{} / {}", p.default_temperature, p.default_max_tokens),
                structured_label(p).to_string(),
                provider_env_var(p.id).to_string(),
            ]
        })
        .collect();
    let header = ["Provider", "Endpoint", "Model", "Temp / Max", "Output", "Key variable"];

    let mut widths = header.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: &[&str]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        format!("  │ {} │\n", padded.join(" │ "))
    };
    let rule = |left: &str, mid: &str, right: &str| {
        let bars: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        format!("  {left}{}{right}\n", bars.join(mid))
    };

    let mut out = rule("┌", "┬", "┐");
    out.push_str(&line(&header));
    out.push_str(&rule("├", "┼", "┤"));
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push_str(&line(&cells));
    }
    out.push_str(&rule("└", "┴", "┘"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lists_every_profile() {
        let table = render_table(all_profiles());
        assert!(table.contains("openai"));
        assert!(table.contains("https://open.bigmodel.cn/api/paas/v4"));
        assert!(table.contains("SMALL_API_KEY"));
        assert!(table.contains("prompt+prose"));
        // Header, three rows and three rules
        assert_eq!(table.lines().count(), 7);
    }

    #[test]
    fn rows_are_aligned() {
        let table = render_table(all_profiles());
        let widths: Vec<usize> = table.lines().map(|l| l.chars().count()).collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]));
    }
}
