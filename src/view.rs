//! ==============================================================================
//! view.rs - terminal rendering for dashboard records
//! ==============================================================================
//!
//! purpose:
//!     turns plugs, sensors and mappings into aligned text tables. pure
//!     functions returning strings so main.rs decides where they go.
//!
//! ==============================================================================

use airplug::{Device, Mapping, PlugDevice};

const EMPTY: &str = "-";

pub fn plugs(plugs: &[PlugDevice]) -> String {
    if plugs.is_empty() {
        return "No plugs found.\n".to_string();
    }
    let rows = plugs
        .iter()
        .map(|p| {
            vec![
                p.tuya_device_id.clone(),
                p.name.clone().unwrap_or_else(|| EMPTY.to_string()),
                p.category.clone().unwrap_or_else(|| EMPTY.to_string()),
                match p.online {
                    Some(true) => "online".to_string(),
                    Some(false) => "offline".to_string(),
                    None => EMPTY.to_string(),
                },
            ]
        })
        .collect();
    table(&["PLUG ID", "NAME", "CATEGORY", "STATUS"], rows)
}

pub fn sensors(devices: &[Device]) -> String {
    if devices.is_empty() {
        return "No sensors bound.\n".to_string();
    }
    let rows = devices
        .iter()
        .map(|d| {
            vec![
                d.sensor_mac.clone(),
                d.device_name.clone().unwrap_or_else(|| EMPTY.to_string()),
                product_name(d),
                on_off(d.enabled),
                d.bound_at.map(|t| t.to_string()).unwrap_or_else(|| EMPTY.to_string()),
            ]
        })
        .collect();
    table(&["SENSOR", "NAME", "PRODUCT", "ENABLED", "BOUND AT"], rows)
}

pub fn mappings(mappings: &[Mapping]) -> String {
    if mappings.is_empty() {
        return "No mappings.\n".to_string();
    }
    let rows = mappings
        .iter()
        .map(|m| {
            vec![
                m.sensor_mac.clone(),
                m.tuya_device_id.clone(),
                on_off(m.enabled),
                m.updated_at.map(|t| t.to_string()).unwrap_or_else(|| EMPTY.to_string()),
            ]
        })
        .collect();
    table(&["SENSOR", "PLUG ID", "AUTOMATION", "UPDATED AT"], rows)
}

fn on_off(enabled: bool) -> String {
    let label = if enabled { "on" } else { "off" };
    label.to_string()
}

// qingping sends product as {"id": .., "name": .., "en_name": ..}
fn product_name(device: &Device) -> String {
    let Some(product) = &device.product else {
        return EMPTY.to_string();
    };
    ["en_name", "name"]
        .iter()
        .find_map(|key| product.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
        .or_else(|| product.as_str().map(str::to_string))
        .unwrap_or_else(|| product.to_string())
}

fn table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, headers.iter().map(|h| h.to_string()), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    push_row(&mut out, rule.into_iter(), &widths);
    for row in rows {
        push_row(&mut out, row.into_iter(), &widths);
    }
    out
}

fn push_row(out: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let line: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{}{}", cell, " ".repeat(pad))
        })
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}
