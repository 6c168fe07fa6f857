//! HTML message rendering.
//!
//! Substitution is strict: every `{placeholder}` in a template must have a
//! value, and an unresolved one is a [`DeliveryError::Template`] — literal
//! placeholder text never reaches a recipient's inbox.

use chrono::{DateTime, Utc};

use ipwatch_core::error::DeliveryError;
use ipwatch_core::traits::{ChangeNotification, DigestNotification};

const CHANGE_TEMPLATE: &str = r#"<html>
    <body style="font-family: Arial, sans-serif; background-color: #f4f4f4; padding: 20px;">
        <div style="max-width: 600px; margin: auto; background-color: #ffffff; padding: 20px; border-radius: 8px; text-align: center;">
            <h1 style="color: #333333;">IP Address Changed</h1>
            <p style="color: #666666; font-size: 18px;">Your public IP address has changed.</p>
            <p style="color: #666666; font-size: 18px;">Previous IP: <strong>{previous}</strong></p>
            <p style="color: #666666; font-size: 18px;">New IP: <strong>{new}</strong></p>
            <p style="color: #666666; font-size: 18px;">Location: <strong>{location}</strong></p>
        </div>
    </body>
</html>"#;

const DIGEST_TEMPLATE: &str = r#"<html>
    <body style="font-family: Arial, sans-serif; background-color: #f4f4f4; padding: 20px;">
        <div style="max-width: 600px; margin: auto; background-color: #ffffff; padding: 20px; border-radius: 8px;">
            <h1 style="color: #333333; text-align: center;">IP Change Summary</h1>
            <p style="color: #666666; font-size: 16px;">{count} change(s) between {from} and {to}.</p>
            <table style="width: 100%; border-collapse: collapse;">
                <tr>
                    <th style="text-align: left; border-bottom: 1px solid #cccccc; padding: 8px;">When</th>
                    <th style="text-align: left; border-bottom: 1px solid #cccccc; padding: 8px;">Address</th>
                    <th style="text-align: left; border-bottom: 1px solid #cccccc; padding: 8px;">Location</th>
                </tr>
{rows}            </table>
        </div>
    </body>
</html>"#;

const DIGEST_ROW_TEMPLATE: &str = r#"                <tr>
                    <td style="padding: 8px; border-bottom: 1px solid #eeeeee;">{when}</td>
                    <td style="padding: 8px; border-bottom: 1px solid #eeeeee;"><strong>{address}</strong></td>
                    <td style="padding: 8px; border-bottom: 1px solid #eeeeee;">{location}</td>
                </tr>
"#;

/// Render the subject and HTML body for one change alert.
pub fn render_change(change: &ChangeNotification) -> Result<(String, String), DeliveryError> {
    let previous = change
        .previous
        .as_ref()
        .map(|state| state.address.to_string())
        .unwrap_or_else(|| "none (first observation)".to_string());

    let subject = format!("IP Address Changed: {}", change.current.address);
    let body = substitute(
        CHANGE_TEMPLATE,
        &[
            ("previous", escape_html(&previous)),
            ("new", change.current.address.to_string()),
            ("location", escape_html(&change.current.location_summary())),
        ],
    )?;
    Ok((subject, body))
}

/// Render the subject and HTML body for a digest over a window of changes.
pub fn render_digest(digest: &DigestNotification) -> Result<(String, String), DeliveryError> {
    let mut rows = String::new();
    for event in &digest.events {
        rows.push_str(&substitute(
            DIGEST_ROW_TEMPLATE,
            &[
                ("when", format_timestamp(event.timestamp)),
                ("address", event.address.to_string()),
                ("location", escape_html(&event.location_summary())),
            ],
        )?);
    }

    let subject = format!(
        "IP Change Summary: {} change(s) since {}",
        digest.events.len(),
        digest.from.format("%Y-%m-%d"),
    );
    let body = substitute(
        DIGEST_TEMPLATE,
        &[
            ("count", digest.events.len().to_string()),
            ("from", format_timestamp(digest.from)),
            ("to", format_timestamp(digest.to)),
            ("rows", rows),
        ],
    )?;
    Ok((subject, body))
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Replace every `{name}` in `template` with its value.
///
/// Values are substituted in one pass over the template, so braces inside a
/// value are never re-interpreted as placeholders.
fn substitute(template: &str, values: &[(&str, String)]) -> Result<String, DeliveryError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            DeliveryError::Template("unterminated placeholder in template".to_string())
        })?;
        let name = &after[..close];
        let value = values
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
            .ok_or_else(|| {
                DeliveryError::Template(format!("no value for placeholder '{{{}}}'", name))
            })?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ipwatch_core::traits::{AddressObservation, ChangeEvent, LastKnownState};

    fn observation(addr: &str) -> AddressObservation {
        AddressObservation::new(addr.parse().unwrap()).with_location(
            Some("Lisbon".to_string()),
            None,
            Some("Portugal".to_string()),
        )
    }

    #[test]
    fn substitute_fills_every_placeholder() {
        let out = substitute(
            "a={a} b={b}",
            &[("a", "1".to_string()), ("b", "2".to_string())],
        )
        .unwrap();
        assert_eq!(out, "a=1 b=2");
    }

    #[test]
    fn unresolved_placeholder_is_a_render_failure() {
        let err = substitute("value={missing}", &[]).unwrap_err();
        assert!(matches!(err, DeliveryError::Template(_)));
    }

    #[test]
    fn braces_in_values_are_not_reinterpreted() {
        let out = substitute("v={a}", &[("a", "{b}".to_string())]).unwrap();
        assert_eq!(out, "v={b}");
    }

    #[test]
    fn change_body_names_both_addresses() {
        let current = observation("5.6.7.8");
        let previous = LastKnownState::from(&observation("1.2.3.4"));
        let (subject, body) = render_change(&ChangeNotification {
            previous: Some(previous),
            current,
        })
        .unwrap();

        assert_eq!(subject, "IP Address Changed: 5.6.7.8");
        assert!(body.contains("1.2.3.4"));
        assert!(body.contains("5.6.7.8"));
        assert!(body.contains("Lisbon, Portugal"));
    }

    #[test]
    fn first_observation_has_no_previous_address() {
        let (_, body) = render_change(&ChangeNotification {
            previous: None,
            current: observation("5.6.7.8"),
        })
        .unwrap();
        assert!(body.contains("none (first observation)"));
    }

    #[test]
    fn digest_renders_one_row_per_event() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        let events = vec![
            ChangeEvent {
                id: 1,
                timestamp: t0,
                address: "1.1.1.1".parse().unwrap(),
                city: Some("Lisbon".to_string()),
                region: None,
                country: Some("Portugal".to_string()),
            },
            ChangeEvent {
                id: 2,
                timestamp: t0 + Duration::days(2),
                address: "2.2.2.2".parse().unwrap(),
                city: None,
                region: None,
                country: None,
            },
        ];

        let (subject, body) = render_digest(&DigestNotification {
            from: t0 - Duration::days(1),
            to: t0 + Duration::days(6),
            events,
        })
        .unwrap();

        assert!(subject.contains("2 change(s)"));
        assert_eq!(body.matches("<td").count(), 6);
        assert!(body.contains("1.1.1.1"));
        assert!(body.contains("2.2.2.2"));
        assert!(body.contains("unknown"));
    }

    #[test]
    fn location_values_are_html_escaped() {
        let current = AddressObservation::new("5.6.7.8".parse().unwrap()).with_location(
            Some("<script>".to_string()),
            None,
            None,
        );
        let (_, body) = render_change(&ChangeNotification {
            previous: None,
            current,
        })
        .unwrap();
        assert!(body.contains("&lt;script&gt;"));
        assert!(!body.contains("<script>"));
    }
}
