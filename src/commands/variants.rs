//! Variant listing command
//!
//! Prints the configured model variants, which one is the default and
//! which pair is used by compare mode.

use crate::config::Config;
use colored::Colorize;
use prettytable::{format, row, Table};

/// Print the configured variants as a table
///
/// # Examples
///
/// ```
/// use lexai::config::Config;
/// use lexai::commands::variants::list_variants;
///
/// list_variants(&Config::default());
/// ```
pub fn list_variants(config: &Config) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.set_titles(row![
        "Variant".bold(),
        "Name".bold(),
        "Framework".bold(),
        "Model".bold(),
        "Host".bold(),
        "Locked".bold()
    ]);

    for (name, variant) in &config.variants {
        let marker = if *name == config.chat.default_variant {
            format!("{} *", name).green().to_string()
        } else {
            name.clone()
        };
        let model = match &variant.adapter {
            Some(adapter) => format!("{} + {}", variant.model, adapter),
            None => variant.model.clone(),
        };
        let locked = if variant.serializes() { "yes" } else { "no" };
        table.add_row(row![
            marker,
            variant.display_name_or(name),
            variant.framework,
            model,
            variant.host(),
            locked
        ]);
    }

    println!();
    table.printstd();
    println!();
    println!("{} default variant", "*".green());
    println!(
        "compare: {}",
        config.compare.variants.join(" vs ").cyan()
    );
    println!();
}
