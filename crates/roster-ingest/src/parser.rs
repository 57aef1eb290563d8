//! HTML extraction for listing and detail pages
//!
//! Both functions are pure: they never fail, and sections missing from the
//! page simply leave the corresponding fields empty.

use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::trace;

use crate::models::{Identifier, StudentRecord};

static LISTING_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".TableText a").expect("static selector"));

static DETAIL_FIELD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".TableContent p").expect("static selector"));

const ADDRESS_MARKER: &str = "Permanent Address :";

/// Extract every roll number linked from a listing page
pub fn parse_listing(html: &str) -> Vec<Identifier> {
    let document = Html::parse_document(html);
    document
        .select(&LISTING_LINK)
        .map(|link| link.text().collect::<String>().trim().to_string())
        .filter(|roll| !roll.is_empty())
        .collect()
}

/// Build a record for `roll` from its detail page
pub fn parse_student(roll: &str, html: &str) -> StudentRecord {
    let document = Html::parse_document(html);
    let mut record = StudentRecord::new(roll);

    for paragraph in document.select(&DETAIL_FIELD) {
        let text = paragraph.text().collect::<String>();
        // Only the text between the first and second colon is the value
        let mut parts = text.trim().split(':');
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        apply_field(&mut record, key.trim(), value.trim());
    }

    record.hometown = hometown(html);
    record
}

fn apply_field(record: &mut StudentRecord, key: &str, value: &str) {
    match key {
        "Name" => record.name = title_case(value),
        "Program" => record.program = value.to_string(),
        "Department" => record.dept = title_case(value),
        "Hostel Info" => {
            let mut parts = value.split(',');
            if let (Some(hall), Some(room)) = (parts.next(), parts.next()) {
                record.hall = hall.trim().to_string();
                record.room = room.trim().to_string();
            }
        },
        "E-Mail" => {
            if let Some((username, _domain)) = value.split_once('@') {
                record.username = username.to_string();
            }
        },
        "Blood Group" => record.blood_group = value.to_string(),
        "Gender" => {
            if let Some((gender, _)) = value.split_once('\t') {
                record.gender = gender.trim().to_string();
            }
        },
        other => trace!(roll = %record.roll, key = other, value, "Ignoring unknown field"),
    }
}

/// Town and state from the permanent address
///
/// The address is a comma-separated run ending in `..., town, state, pin`;
/// the two parts before the last are kept.
fn hometown(html: &str) -> String {
    let Some((_, address)) = html.split_once(ADDRESS_MARKER) else {
        return String::new();
    };

    let parts: Vec<&str> = address.split(',').collect();
    if parts.len() > 2 {
        let n = parts.len();
        format!("{}, {}", parts[n - 3].trim(), parts[n - 2].trim())
    } else {
        String::new()
    }
}

/// Lowercase everything, then capitalise the first letter of each word
fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for ch in value.chars() {
        if at_word_start {
            out.extend(ch.to_uppercase());
        } else {
            out.extend(ch.to_lowercase());
        }
        at_word_start = is_word_separator(ch);
    }
    out
}

/// ASCII punctuation and any whitespace end a word; `_` and letters or
/// digits in any script do not
fn is_word_separator(ch: char) -> bool {
    if ch.is_ascii() {
        !(ch.is_ascii_alphanumeric() || ch == '_')
    } else if ch.is_alphanumeric() {
        false
    } else {
        ch.is_whitespace()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const LISTING: &str = r##"
        <html><body><table>
          <tr><td class="TableText"><a href="?r=190001"> 190001 </a></td></tr>
          <tr><td class="TableText"><a href="?r=190002">190002</a></td></tr>
          <tr><td class="TableText"><a href="#">   </a></td></tr>
          <tr><td class="Other"><a href="?r=999">999</a></td></tr>
        </table></body></html>
    "##;

    const DETAIL: &str = "<html><body><div class=\"TableContent\">\
        <p>Name : ASHA RAO</p>\
        <p>Program : BTech</p>\
        <p>Department : ELECTRICAL ENGG.</p>\
        <p>Hostel Info : HALL-5, C-204</p>\
        <p>E-Mail : asharao@iitk.ac.in</p>\
        <p>Blood Group : B+</p>\
        <p>Gender : F\t (Female)</p>\
        <p>Favourite Colour : Teal</p>\
        <p>no separator here</p>\
        </div>\
        <p>Permanent Address : 12 Lane, Near Temple, Kanpur, Uttar Pradesh, 208016</p>\
        </body></html>";

    #[test]
    fn test_parse_listing() {
        assert_eq!(parse_listing(LISTING), vec!["190001", "190002"]);
    }

    #[test]
    fn test_parse_listing_empty_page() {
        assert!(parse_listing("<html><body>No records</body></html>").is_empty());
    }

    #[test]
    fn test_parse_student_fields() {
        let record = parse_student("190001", DETAIL);

        assert_eq!(record.roll, "190001");
        assert_eq!(record.name, "Asha Rao");
        assert_eq!(record.program, "BTech");
        assert_eq!(record.dept, "Electrical Engg.");
        assert_eq!(record.hall, "HALL-5");
        assert_eq!(record.room, "C-204");
        assert_eq!(record.username, "asharao");
        assert_eq!(record.blood_group, "B+");
        assert_eq!(record.gender, "F");
        assert_eq!(record.hometown, "Kanpur, Uttar Pradesh");
    }

    #[test]
    fn test_parse_student_missing_sections() {
        let record = parse_student("190002", "<html><body><p>Nothing here</p></body></html>");

        assert_eq!(record.roll, "190002");
        assert!(record.name.is_empty());
        assert!(record.hall.is_empty());
        assert!(record.hometown.is_empty());
    }

    #[test]
    fn test_field_value_stops_at_second_colon() {
        let html = r#"<div class="TableContent"><p>Program : BTech : Dual</p></div>"#;
        let record = parse_student("1", html);
        assert_eq!(record.program, "BTech");
    }

    #[test]
    fn test_hostel_without_room_is_ignored() {
        let html = r#"<div class="TableContent"><p>Hostel Info : Not Allotted</p></div>"#;
        let record = parse_student("1", html);
        assert!(record.hall.is_empty());
        assert!(record.room.is_empty());
    }

    #[test]
    fn test_hometown_needs_three_parts() {
        assert_eq!(hometown("Permanent Address : Kanpur, 208016"), "");
        assert_eq!(hometown("no address"), "");
        assert_eq!(hometown("Permanent Address : A, Kanpur, UP, 208016"), "Kanpur, UP");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("ASHA RAO"), "Asha Rao");
        assert_eq!(title_case("computer sc. & engg."), "Computer Sc. & Engg.");
        assert_eq!(title_case("d'souza"), "D'Souza");
        assert_eq!(title_case("RAM-KUMAR"), "Ram-Kumar");
        assert_eq!(title_case("snake_case"), "Snake_case");
    }
}
