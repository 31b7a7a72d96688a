//! Terminal rendering for daemon responses.

use lookout_shared::{Action, FrameReport, HealthResponse, Incident, RouteCandidate, SearchHit};
use owo_colors::OwoColorize;

fn action_label(action: Action) -> String {
    let label = action.as_str().to_uppercase();
    match action {
        Action::Reroute => label.red().bold().to_string(),
        Action::Dispatch => label.yellow().bold().to_string(),
        Action::Monitor => label.cyan().to_string(),
        Action::Dismiss => label.dimmed().to_string(),
    }
}

fn rating_label(rating: u8) -> String {
    let text = format!("{}/10", rating);
    if rating >= 7 {
        text.red().to_string()
    } else if rating >= 4 {
        text.yellow().to_string()
    } else {
        text.green().to_string()
    }
}

pub fn print_health(health: &HealthResponse) {
    println!("{}", "lookoutd".bold());
    println!("  {:<16} {}", "Status:", health.status.green());
    println!("  {:<16} {}", "Version:", health.version);
    println!("  {:<16} {}s", "Uptime:", health.uptime_seconds);
    println!("  {:<16} {:?}", "Vector backend:", health.vector_backend);
}

pub fn print_report(report: &FrameReport) {
    let i = &report.incident;
    println!(
        "{} #{} {} ({})",
        "Incident".bold(),
        i.id,
        i.event_type.to_string().bold(),
        rating_label(i.rating)
    );
    println!("  {:<14} {:.2}", "Confidence:", i.confidence);
    println!("  {:<14} {:.5}, {:.5}", "Location:", i.lat, i.lon);
    println!(
        "  {:<14} {} vehicles, {} lanes blocked",
        "Scene:", i.vehicles_detected, i.blocked_lanes
    );
    if !i.description.is_empty() {
        println!("  {:<14} {}", "Description:", i.description);
    }
    println!("  {:<14} {}", "Notification:", report.notification);

    println!();
    println!(
        "{} {} ({:.2})",
        "Decision:".bold(),
        action_label(report.decision.action),
        report.decision.final_confidence
    );
    println!("  {}", report.decision.explanation);
    println!(
        "  {} similar, clearance ~{:.0} min{}",
        report.similar_incidents.len(),
        report.estimated_clearance_minutes,
        if report.is_false_positive {
            ", likely false positive".yellow().to_string()
        } else {
            String::new()
        }
    );

    if let Some(route) = &report.route {
        println!();
        print_route(route);
    }

    let d = &report.debug;
    println!(
        "{}",
        format!(
            "  [classify {:?}, embed {:?}, upsert {:?}, search {:?}, decide {:?}]",
            d.classification, d.embedding, d.vector_upsert, d.vector_search, d.decision
        )
        .dimmed()
    );
}

pub fn print_route(route: &RouteCandidate) {
    println!(
        "{} {:.1} km, {:.0} min, {} points",
        "Route:".bold(),
        route.distance_meters / 1000.0,
        route.duration_seconds / 60.0,
        route.coordinates.len()
    );
    if let Some(clearance) = route.min_clearance {
        println!("  Closest approach to avoided points: {:.4} deg", clearance);
    }
}

/// One line per incident.
pub fn incident_line(i: &Incident) -> String {
    format!(
        "{:>5}  {}  {:<16} {:>5}  conf {:.2}  {:.4},{:.4}",
        i.id,
        i.timestamp.format("%Y-%m-%d %H:%M:%S"),
        i.event_type.as_str(),
        format!("{}/10", i.rating),
        i.confidence,
        i.lat,
        i.lon
    )
}

pub fn print_incidents(incidents: &[Incident]) {
    if incidents.is_empty() {
        println!("{}", "No incidents recorded".dimmed());
        return;
    }
    for i in incidents {
        println!("{}", incident_line(i));
    }
}

pub fn print_search(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("{}", "No matching incidents".dimmed());
        return;
    }
    for hit in hits {
        println!("{}  {}", format!("{:.3}", hit.score).bold(), incident_line(&hit.incident));
    }
}

pub fn print_incident(i: &Incident) {
    println!("{}", incident_line(i).bold());
    if !i.description.is_empty() {
        println!("  {}", i.description);
    }
    println!("  {}", i.notification);
    if let Some(minutes) = i.clearance_minutes {
        println!("  Cleared after {:.0} min", minutes);
    }
    if let Some(path) = &i.image_path {
        println!("  Frame: {}", path.dimmed());
    }
}
