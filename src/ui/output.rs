use crate::output::is_quiet;
use crate::ui::{Icons, theme};
use crate::update::Update;
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}", Icons::ROCKET, text.style(theme().header.clone()));
}

pub fn success(label: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn info(label: &str, value: &str) {
    if is_quiet() {
        return;
    }
    println!(
        "{} {}: {}",
        Icons::INFO.style(theme().info.clone()),
        label.style(theme().dim.clone()),
        value
    );
}

pub fn phase(name: &str) {
    if is_quiet() {
        return;
    }
    println!();
    println!(
        "{} {}",
        Icons::GEAR.style(theme().info.clone()),
        name.style(theme().header.clone())
    );
}

pub fn file_modified(path: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}", Icons::MOD.style(theme().warn.clone()), path);
}

/// `📦 name from → to (referrer)`
pub fn update_row(update: &Update) {
    if is_quiet() {
        return;
    }
    let from = update.version.from.as_deref().unwrap_or("?");
    println!(
        "{} {} {} → {} {}",
        Icons::PACKAGE,
        update.name.style(theme().header.clone()),
        from.style(theme().muted.clone()),
        update.version.to.style(theme().success.clone()),
        format!("({})", update.referrer.display()).style(theme().dim.clone())
    );
}

pub fn commit_done(message: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}", Icons::COMMIT, message.style(theme().success.clone()));
}
