use std::path::Path;

use docxide_layout::Error;
use docxide_layout::fonts::{FontBook, FontMetrics, primary_font_name};

#[test]
fn fallback_widths_scale_with_size() {
    let book = FontBook::new();
    let metrics = book.get(None, false, false);
    let small = metrics.word_width("Pagination", 10.0);
    let large = metrics.word_width("Pagination", 20.0);
    assert!(small > 0.0);
    assert!((large - 2.0 * small).abs() < 0.001);
    assert!(metrics.word_width("WWW", 11.0) > metrics.word_width("iii", 11.0));
    assert_eq!(metrics.char_width_1000('\n'), 0.0);
}

#[test]
fn lookup_tries_candidates_then_the_regular_face() {
    let mut book = FontBook::new();
    let mut wide = FontMetrics::helvetica();
    wide.line_h_ratio = Some(1.5);
    book.register("Body Font", false, false, wide);
    assert_eq!(book.len(), 1);

    let found = book.get(Some("Missing; body font"), false, false);
    assert_eq!(found.line_h_ratio, Some(1.5));
    let regular = book.get(Some("Body Font"), true, true);
    assert_eq!(regular.line_h_ratio, Some(1.5));
    assert_eq!(book.get(Some("Other"), false, false).line_h_ratio, None);
}

#[test]
fn primary_name_is_the_first_candidate() {
    assert_eq!(primary_font_name(" Calibri ; Arial"), "Calibri");
    assert_eq!(primary_font_name("Arial"), "Arial");
}

#[test]
fn unreadable_font_files_are_errors() {
    let mut book = FontBook::new();
    let err = book
        .register_file("Ghost", Path::new("tests/fixtures/no-such-font.ttf"))
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)), "got {err}");
    assert!(book.is_empty());

    let err = FontMetrics::from_font_data(b"not a font", 0).unwrap_err();
    assert!(matches!(err, Error::Font(_)), "got {err}");
}
