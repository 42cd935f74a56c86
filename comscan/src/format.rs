//! Plain-text rendering of scan results.

use crate::record::{PortDetails, PortSummary};

const UNKNOWN: &str = "-";

fn presence(is_present: bool) -> &'static str {
    if is_present { "present" } else { "absent" }
}

/// One line per summary: name, presence, description, manufacturer, status.
pub fn summary_line(summary: &PortSummary) -> String {
    let mut line = format!(
        "{} ({})",
        summary.port_name,
        presence(summary.is_present)
    );
    if let Some(description) = &summary.description {
        line.push_str(&format!(" - {description}"));
    }
    if let Some(manufacturer) = &summary.manufacturer {
        line.push_str(&format!(" [{manufacturer}]"));
    }
    if let Some(status) = &summary.status {
        line.push_str(&format!(" {status}"));
    }
    line
}

/// `VID:PID` when both ids are known.
pub fn vid_pid(details: &PortDetails) -> Option<String> {
    match (
        &details.usb_details.vendor_id,
        &details.usb_details.product_id,
    ) {
        (Some(vid), Some(pid)) => Some(format!("{vid}:{pid}")),
        _ => None,
    }
}

/// Column-aligned table: name, presence, bridge, VID:PID, description.
pub fn format_port_table(ports: &[PortDetails]) -> Vec<String> {
    let rows: Vec<[String; 5]> = ports
        .iter()
        .map(|p| {
            let kind = p.usb_details.device_kind();
            [
                p.port_name.clone(),
                presence(p.is_present).to_string(),
                if kind.is_known() { kind.name().to_string() } else { UNKNOWN.to_string() },
                vid_pid(p).unwrap_or_else(|| UNKNOWN.to_string()),
                p.friendly_name
                    .clone()
                    .or_else(|| p.description.clone())
                    .unwrap_or_else(|| UNKNOWN.to_string()),
            ]
        })
        .collect();

    let mut widths = [0usize; 4];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    rows.iter()
        .map(|row| {
            format!(
                "{:<w0$}  {:<w1$}  {:<w2$}  {:<w3$}  {}",
                row[0],
                row[1],
                row[2],
                row[3],
                row[4],
                w0 = widths[0],
                w1 = widths[1],
                w2 = widths[2],
                w3 = widths[3],
            )
            .trim_end()
            .to_string()
        })
        .collect()
}

/// Key/value pairs of a detailed record, skipping unknown fields.
pub fn detail_fields(details: &PortDetails) -> Vec<(&'static str, String)> {
    let mut fields = vec![("present", details.is_present.to_string())];
    let mut push = |key: &'static str, value: &Option<String>| {
        if let Some(value) = value {
            fields.push((key, value.clone()));
        }
    };

    push("description", &details.description);
    push("manufacturer", &details.manufacturer);
    push("status", &details.status);
    push("friendly name", &details.friendly_name);
    push("device id", &details.device_id);
    push("registry path", &details.registry_path);
    push("driver provider", &details.driver_info.provider);
    push("driver date", &details.driver_info.date);
    push("driver version", &details.driver_info.version);
    push("vendor id", &details.usb_details.vendor_id);
    push("product id", &details.usb_details.product_id);
    push("serial number", &details.usb_details.serial_number);
    push("usb manufacturer", &details.usb_details.manufacturer);
    push("usb product", &details.usb_details.product_name);
    push("class guid", &details.system_details.class_guid);
    push("config flags", &details.system_details.config_flags);
    push("problem code", &details.system_details.problem_code);

    let kind = details.usb_details.device_kind();
    if kind.is_known() {
        fields.push(("bridge", kind.name().to_string()));
    }
    if !details.hardware_ids.is_empty() {
        fields.push(("hardware ids", details.hardware_ids.join(", ")));
    }
    if !details.compatible_ids.is_empty() {
        fields.push(("compatible ids", details.compatible_ids.join(", ")));
    }
    fields
}

/// Header line plus one indented `key: value` line per known field.
pub fn detail_lines(details: &PortDetails) -> Vec<String> {
    let fields = detail_fields(details);
    let width = fields
        .iter()
        .map(|(k, _)| k.len())
        .max()
        .unwrap_or(0);

    std::iter::once(details.port_name.clone())
        .chain(
            fields
                .into_iter()
                .map(|(key, value)| format!("  {:<width$}  {value}", format!("{key}:"), width = width + 1)),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DriverInfo, SystemDetails, UsbDetails};

    fn details(name: &str, present: bool) -> PortDetails {
        PortDetails {
            port_name: name.to_string(),
            is_present: present,
            description: None,
            manufacturer: None,
            device_id: None,
            friendly_name: None,
            status: None,
            registry_path: None,
            hardware_ids: Vec::new(),
            compatible_ids: Vec::new(),
            driver_info: DriverInfo::default(),
            usb_details: UsbDetails::default(),
            system_details: SystemDetails::default(),
        }
    }

    #[test]
    fn test_summary_line() {
        let summary = PortSummary {
            port_name: "COM7".to_string(),
            is_present: true,
            description: Some("USB-SERIAL CH340".to_string()),
            manufacturer: Some("wch.cn".to_string()),
            status: Some("OK".to_string()),
        };
        assert_eq!(summary_line(&summary), "COM7 (present) - USB-SERIAL CH340 [wch.cn] OK");

        let absent = PortSummary {
            port_name: "COM3".to_string(),
            is_present: false,
            description: None,
            manufacturer: None,
            status: None,
        };
        assert_eq!(summary_line(&absent), "COM3 (absent)");
    }

    #[test]
    fn test_port_table_alignment() {
        let mut usb = details("COM7", true);
        usb.usb_details.vendor_id = Some("1A86".to_string());
        usb.usb_details.product_id = Some("7523".to_string());
        usb.friendly_name = Some("USB-SERIAL CH340 (COM7)".to_string());
        let legacy = details("COM10", false);

        let lines = format_port_table(&[usb, legacy]);
        assert_eq!(lines[0], "COM7   present  CH340/CH341  1A86:7523  USB-SERIAL CH340 (COM7)");
        assert_eq!(lines[1], "COM10  absent   -            -          -");
    }

    #[test]
    fn test_detail_lines_skip_unknown() {
        let mut port = details("COM7", true);
        port.description = Some("USB-SERIAL CH340".to_string());
        port.hardware_ids = vec![r"USB\VID_1A86&PID_7523".to_string()];

        let lines = detail_lines(&port);
        assert_eq!(lines[0], "COM7");
        assert!(lines.iter().any(|l| l.trim_start().starts_with("description:")));
        assert!(lines.iter().any(|l| l.contains(r"USB\VID_1A86&PID_7523")));
        assert!(!lines.iter().any(|l| l.contains("registry path")));
    }
}
