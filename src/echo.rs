//! Timestamped console output for user-facing progress lines.

use chrono::{DateTime, Local};

fn format_line(now: DateTime<Local>, message: &str) -> String {
    format!(
        "[dbx][{}] {}",
        now.format("%Y-%m-%d %H:%M:%S%.3f"),
        message
    )
}

pub fn echo(message: impl AsRef<str>) {
    println!("{}", format_line(Local::now(), message.as_ref()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn prefixes_millisecond_timestamp() {
        let now = Local
            .with_ymd_and_hms(2021, 3, 4, 5, 6, 7)
            .single()
            .expect("unambiguous local time");
        assert_eq!(
            format_line(now, "Locating package file"),
            "[dbx][2021-03-04 05:06:07.000] Locating package file"
        );
    }
}
