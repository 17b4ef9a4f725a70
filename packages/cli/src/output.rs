// ABOUTME: Table and value formatting for box and image listings
// ABOUTME: Human-readable sizes, port summaries and the shared comfy-table style

use chrono::{DateTime, Utc};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use vbox_boxes::{BoxInfo, ImageInfo, Port};

const SIZE_UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

/// Size in 1024 units with one decimal, e.g. `1.5 GB`
pub fn human_size(bytes: i64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes.max(0));
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, SIZE_UNITS[unit])
}

/// `0.0.0.0:40022->22/tcp, 80/tcp`
pub fn format_ports(ports: &[Port]) -> String {
    ports
        .iter()
        .map(|p| {
            if p.public_port == 0 {
                p.key()
            } else {
                let ip = if p.ip.is_empty() { "0.0.0.0" } else { &p.ip };
                format!("{}:{}->{}", ip, p.public_port, p.key())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn format_created(created: &DateTime<Utc>) -> String {
    created.format("%Y-%m-%d %H:%M").to_string()
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn boxes_table(boxes: &[BoxInfo]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["ID", "NAME", "IMAGE", "STATUS", "STATE", "PORTS"]);
    for b in boxes {
        table.add_row(vec![
            b.short_id().to_string(),
            b.name.clone(),
            b.image.clone(),
            b.status.clone(),
            b.state.clone(),
            format_ports(&b.ports),
        ]);
    }
    table
}

pub fn images_table(images: &[ImageInfo]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["NAME", "VERSION", "IMAGE ID", "SIZE", "CREATED"]);
    for image in images {
        table.add_row(vec![
            image.name.clone(),
            image.version.clone(),
            image.id.chars().take(12).collect::<String>(),
            human_size(image.size),
            format_created(&image.created),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0 B")]
    #[case(512, "512 B")]
    #[case(1024, "1.0 KB")]
    #[case(1536, "1.5 KB")]
    #[case(78 * 1024 * 1024, "78.0 MB")]
    #[case(3 * 1024 * 1024 * 1024, "3.0 GB")]
    fn test_human_size(#[case] bytes: i64, #[case] expected: &str) {
        assert_eq!(human_size(bytes), expected);
    }

    #[test]
    fn test_format_ports() {
        let http: Port = "80".parse().unwrap();
        let ports = vec![Port::tcp(22, 40022), http];
        assert_eq!(format_ports(&ports), "0.0.0.0:40022->22/tcp, 80/tcp");
    }

    #[test]
    fn test_boxes_table_uses_short_ids() {
        let boxes = vec![BoxInfo {
            id: "0123456789abcdef0123".to_string(),
            name: "dev".to_string(),
            image: "base:1.0".to_string(),
            status: "Up 3 minutes".to_string(),
            state: "running".to_string(),
            ports: vec![Port::tcp(22, 40022)],
        }];
        let rendered = boxes_table(&boxes).to_string();
        assert!(rendered.contains("0123456789ab"));
        assert!(!rendered.contains("0123456789abc"));
        assert!(rendered.contains("NAME"));
    }

    #[test]
    fn test_images_table() {
        let images = vec![ImageInfo {
            id: "abcdef0123456789".to_string(),
            name: "base".to_string(),
            version: "1.0".to_string(),
            size: 2048,
            created: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
        }];
        let rendered = images_table(&images).to_string();
        assert!(rendered.contains("abcdef012345"));
        assert!(rendered.contains("2.0 KB"));
        assert!(rendered.contains("1970-01-01 00:00"));
    }
}
