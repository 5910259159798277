//! Captcha challenges.
//!
//! A challenge is six characters from `A-Z0-9`, rendered as a distorted
//! SVG and embedded in the form as a `data:` URL. The expected text lives
//! server-side in the session; see `session::SessionStore::issue_captcha`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::Rng;
use std::fmt::Write as _;

pub const CAPTCHA_LEN: usize = 6;
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const WIDTH: u32 = 280;
const HEIGHT: u32 = 100;
const NOISE_LINES: usize = 8;
const NOISE_DOTS: usize = 40;

/// A freshly generated challenge.
#[derive(Debug, Clone)]
pub struct CaptchaChallenge {
    /// Expected answer, upper-case.
    pub text: String,
    /// `data:image/svg+xml;base64,...`
    pub image: String,
}

pub fn generate_challenge() -> CaptchaChallenge {
    let mut rng = rand::thread_rng();
    let text: String = (0..CAPTCHA_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    let image = render_data_url(&text, &mut rng);
    CaptchaChallenge { text, image }
}

/// Case-insensitive exact match, ignoring surrounding whitespace.
pub fn verify(input: &str, expected: &str) -> bool {
    !expected.is_empty() && input.trim().eq_ignore_ascii_case(expected)
}

fn render_data_url<R: Rng>(text: &str, rng: &mut R) -> String {
    let svg = render_svg(text, rng);
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg))
}

fn render_svg<R: Rng>(text: &str, rng: &mut R) -> String {
    let mut svg = String::with_capacity(4096);
    let _ = write!(
        svg,
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}"><rect width="100%" height="100%" fill="#f4f1ea"/>"##
    );

    for _ in 0..NOISE_LINES {
        let _ = write!(
            svg,
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="{}"/>"#,
            rng.gen_range(0..WIDTH),
            rng.gen_range(0..HEIGHT),
            rng.gen_range(0..WIDTH),
            rng.gen_range(0..HEIGHT),
            random_color(rng),
            rng.gen_range(1..3),
        );
    }

    let step = (WIDTH - 40) / text.len().max(1) as u32;
    for (i, ch) in text.chars().enumerate() {
        let x = 20 + step * i as u32 + rng.gen_range(0..8);
        let y = rng.gen_range(55..80);
        let angle: i32 = rng.gen_range(-30..=30);
        let size = rng.gen_range(34..46);
        let _ = write!(
            svg,
            r#"<text x="{x}" y="{y}" font-family="monospace" font-size="{size}" font-weight="bold" fill="{}" transform="rotate({angle} {x} {y})">{ch}</text>"#,
            random_color(rng),
        );
    }

    for _ in 0..NOISE_DOTS {
        let _ = write!(
            svg,
            r#"<circle cx="{}" cy="{}" r="{}" fill="{}"/>"#,
            rng.gen_range(0..WIDTH),
            rng.gen_range(0..HEIGHT),
            rng.gen_range(1..3),
            random_color(rng),
        );
    }

    svg.push_str("</svg>");
    svg
}

fn random_color<R: Rng>(rng: &mut R) -> String {
    format!(
        "rgb({},{},{})",
        rng.gen_range(20..160),
        rng.gen_range(20..160),
        rng.gen_range(20..160)
    )
}
