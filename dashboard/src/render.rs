use crate::model::{Quantity, Reading};
use std::fmt::Write;

const CHART_WIDTH: f64 = 900.0;
const CHART_HEIGHT: f64 = 420.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 50.0;
const Y_TICKS: usize = 5;
const X_LABELS: usize = 6;

/// Everything the page needs, borrowed from the shared state
pub struct DashboardView<'a> {
    pub readings: &'a [Reading],
    pub quantity: Quantity,
    pub last_error: Option<&'a str>,
    pub refresh_secs: u64,
}

pub fn render_dashboard(view: &DashboardView<'_>) -> String {
    let mut body = String::new();

    if let Some(err) = view.last_error {
        let _ = write!(
            body,
            r#"<div class="warning">⚠ {}</div>"#,
            html_escape(err)
        );
    }

    match view.readings.last() {
        Some(latest) => {
            body.push_str(&render_chart(view.readings, view.quantity));
            body.push_str(&render_live_readings(latest));
        }
        None => body.push_str(r#"<div class="warning">Waiting for live data...</div>"#),
    }

    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="{refresh}">
<title>Live BME 680 Sensor Dashboard</title>
<style>
    body {{ margin: 0; font-family: system-ui, sans-serif; background: #1e1e1e; color: white; display: flex; }}
    .sidebar {{ width: 220px; min-height: 100vh; padding: 1.5rem 1rem; background: #262626; box-sizing: border-box; }}
    .sidebar label {{ display: block; margin-bottom: 0.4rem; }}
    .sidebar select, .sidebar button, .sidebar a.button {{ width: 100%; margin-bottom: 1rem; padding: 0.5rem; box-sizing: border-box; }}
    .sidebar a.button {{ display: block; text-align: center; color: white; background: #444; border-radius: 4px; text-decoration: none; }}
    .main {{ flex: 1; padding: 1.5rem 2rem; }}
    .warning {{ margin-bottom: 1rem; padding: 0.75rem 1rem; border-radius: 5px; background: #4d3b00; color: #ffd866; }}
    .chart {{ width: 100%; max-width: {width}px; }}
    .bordered-box {{ margin-top: 1rem; border: 1px solid orange; padding: 10px; border-radius: 5px; background-color: #333333; color: white; max-width: 420px; }}
</style>
</head>
<body>
<div class="sidebar">
    <form method="get" action="/">
        <label for="quantity">Select Quantity</label>
        <select id="quantity" name="quantity" onchange="this.form.submit()">
{options}        </select>
    </form>
    <form method="post" action="/refresh?quantity={quantity}">
        <button type="submit">Refresh Data</button>
    </form>
    <a class="button" href="/download" download="live_sensor_readings.csv">Download CSV</a>
</div>
<div class="main">
<h1>Live BME 680 Sensor Dashboard</h1>
{body}
</div>
</body>
</html>
"#,
        refresh = view.refresh_secs,
        width = CHART_WIDTH,
        options = render_options(view.quantity),
        quantity = view.quantity,
        body = body,
    )
}

fn render_options(selected: Quantity) -> String {
    let mut out = String::new();
    for quantity in Quantity::ALL {
        let marker = if quantity == selected { " selected" } else { "" };
        let _ = writeln!(
            out,
            r#"            <option value="{q}"{marker}>{q}</option>"#,
            q = quantity,
            marker = marker
        );
    }
    out
}

/// Styled panel with the latest reading, two decimals per field
pub fn render_live_readings(reading: &Reading) -> String {
    let dew_point = reading
        .dew_point
        .map(|dp| format!("{:.2} °C", dp))
        .unwrap_or_else(|| "n/a".to_string());

    format!(
        r#"<div class="bordered-box">
    <h3>Live Readings</h3>
    <p><strong>Temperature:</strong> {:.2} °C</p>
    <p><strong>Pressure:</strong> {:.2} hPa</p>
    <p><strong>Gas:</strong> {:.2} ppm</p>
    <p><strong>Humidity:</strong> {:.2} %</p>
    <p><strong>DewPoint:</strong> {}</p>
</div>
"#,
        reading.temperature, reading.pressure, reading.gas, reading.humidity, dew_point
    )
}

/// Line chart of `quantity` over time as inline SVG.
/// Axis ranges follow the data; a flat series gets one unit of padding.
pub fn render_chart(readings: &[Reading], quantity: Quantity) -> String {
    let values: Vec<f64> = readings.iter().map(|r| r.value(quantity)).collect();

    let (mut lo, mut hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    if !lo.is_finite() || !hi.is_finite() {
        lo = 0.0;
        hi = 1.0;
    }
    if (hi - lo).abs() < f64::EPSILON {
        lo -= 1.0;
        hi += 1.0;
    }

    let plot_w = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let x_at = |i: usize| {
        if values.len() < 2 {
            MARGIN_LEFT + plot_w / 2.0
        } else {
            MARGIN_LEFT + plot_w * i as f64 / (values.len() - 1) as f64
        }
    };
    let y_at = |v: f64| MARGIN_TOP + plot_h * (hi - v) / (hi - lo);

    let mut svg = String::new();
    let _ = write!(
        svg,
        r##"<svg class="chart" viewBox="0 0 {w} {h}" xmlns="http://www.w3.org/2000/svg" font-size="12" fill="white">
<rect width="{w}" height="{h}" fill="#2d2d2d"/>
<text x="{cx}" y="24" text-anchor="middle" font-size="16">Live {q} Readings</text>
"##,
        w = CHART_WIDTH,
        h = CHART_HEIGHT,
        cx = CHART_WIDTH / 2.0,
        q = quantity,
    );

    for tick in 0..Y_TICKS {
        let v = lo + (hi - lo) * tick as f64 / (Y_TICKS - 1) as f64;
        let y = y_at(v);
        let _ = writeln!(
            svg,
            r##"<line x1="{x1}" y1="{y:.1}" x2="{x2}" y2="{y:.1}" stroke="#444"/><text x="{lx}" y="{ty:.1}" text-anchor="end">{v:.2}</text>"##,
            x1 = MARGIN_LEFT,
            x2 = CHART_WIDTH - MARGIN_RIGHT,
            lx = MARGIN_LEFT - 8.0,
            ty = y + 4.0,
        );
    }

    for i in x_label_indices(readings.len()) {
        let _ = writeln!(
            svg,
            r#"<text x="{x:.1}" y="{y}" text-anchor="middle">{label}</text>"#,
            x = x_at(i),
            y = CHART_HEIGHT - MARGIN_BOTTOM + 18.0,
            label = html_escape(&readings[i].timestamp),
        );
    }

    let _ = writeln!(
        svg,
        r#"<text x="{x}" y="{y}" text-anchor="middle">Time</text>"#,
        x = MARGIN_LEFT + plot_w / 2.0,
        y = CHART_HEIGHT - 10.0,
    );
    let _ = writeln!(
        svg,
        r#"<text x="16" y="{y}" text-anchor="middle" transform="rotate(-90 16 {y})">{unit}</text>"#,
        y = MARGIN_TOP + plot_h / 2.0,
        unit = html_escape(quantity.unit()),
    );

    let points: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(i, v)| format!("{:.1},{:.1}", x_at(i), y_at(*v)))
        .collect();
    let _ = writeln!(
        svg,
        r#"<polyline fill="none" stroke="orange" stroke-width="2" points="{}"/>"#,
        points.join(" ")
    );
    if let [only] = points.as_slice() {
        let (x, y) = only.split_once(',').unwrap_or(("0", "0"));
        let _ = writeln!(svg, r#"<circle cx="{}" cy="{}" r="3" fill="orange"/>"#, x, y);
    }

    svg.push_str("</svg>\n");
    svg
}

/// Evenly spread label positions, always including the first and last row
fn x_label_indices(len: usize) -> Vec<usize> {
    match len {
        0 => Vec::new(),
        n if n <= X_LABELS => (0..n).collect(),
        n => {
            let mut idx: Vec<usize> = (0..X_LABELS)
                .map(|k| k * (n - 1) / (X_LABELS - 1))
                .collect();
            idx.dedup();
            idx
        }
    }
}

/// escape html special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
