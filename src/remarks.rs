//! Principal and class-teacher remarks keyed by a student's rounded term average.
//!
//! Phrasing is deliberately varied in production: each band holds three candidates and
//! one is drawn from the injected RNG. Seed the RNG to make the choice reproducible.

use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemarkBand {
    Ninety,
    Eighty,
    Seventy,
    Sixty,
    Fifty,
    Forty,
    Thirty,
    Below,
}

impl RemarkBand {
    pub fn for_average(term_average: f64) -> RemarkBand {
        let rounded = if term_average.is_finite() {
            term_average.round() as i64
        } else {
            0
        };
        match rounded {
            r if r >= 90 => RemarkBand::Ninety,
            r if r >= 80 => RemarkBand::Eighty,
            r if r >= 70 => RemarkBand::Seventy,
            r if r >= 60 => RemarkBand::Sixty,
            r if r >= 50 => RemarkBand::Fifty,
            r if r >= 40 => RemarkBand::Forty,
            r if r >= 30 => RemarkBand::Thirty,
            _ => RemarkBand::Below,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemarkAuthor {
    Principal,
    Teacher,
}

fn pool(author: RemarkAuthor, band: RemarkBand) -> &'static [&'static str; 3] {
    use RemarkAuthor::*;
    use RemarkBand::*;
    match (author, band) {
        (Principal, Ninety) => &[
            "An exceptional result. Keep setting the standard.",
            "Outstanding performance this term. Well done.",
            "A brilliant term's work. The school is proud of you.",
        ],
        (Principal, Eighty) => &[
            "Excellent result. Keep up the good work.",
            "A very impressive performance this term.",
            "Excellent effort. Aim even higher next term.",
        ],
        (Principal, Seventy) => &[
            "Very good result. There is room to reach the top.",
            "A very good term. Stay focused and consistent.",
            "Commendable performance. Keep pushing.",
        ],
        (Principal, Sixty) => &[
            "Good result. More effort will bring better grades.",
            "A good term's work. Work on your weaker subjects.",
            "Good performance. Keep improving.",
        ],
        (Principal, Fifty) => &[
            "A fair result. You can do much better.",
            "Average performance. Put in more effort next term.",
            "Fair work. Study harder to improve.",
        ],
        (Principal, Forty) => &[
            "Below expectations. Serious improvement is needed.",
            "A weak result. More dedication is required.",
            "You must work harder next term.",
        ],
        (Principal, Thirty) => &[
            "A poor result. Extra support is recommended.",
            "Poor performance. Parents should see the class teacher.",
            "Much more effort is required to make progress.",
        ],
        (Principal, Below) => &[
            "A very poor result. Urgent attention is needed.",
            "Performance is far below standard. See the principal.",
            "Very weak result. A study plan must be agreed with parents.",
        ],
        (Teacher, Ninety) => &[
            "A hardworking and brilliant student.",
            "Exceptional focus and dedication in class.",
            "A model student in every subject.",
        ],
        (Teacher, Eighty) => &[
            "Diligent and attentive in class.",
            "Shows excellent understanding of the work.",
            "A very committed learner.",
        ],
        (Teacher, Seventy) => &[
            "Works well and participates actively.",
            "A steady and reliable student.",
            "Good attitude to learning. Keep it up.",
        ],
        (Teacher, Sixty) => &[
            "Capable of more with greater concentration.",
            "A good effort. Needs to revise regularly.",
            "Shows promise. Should ask more questions in class.",
        ],
        (Teacher, Fifty) => &[
            "Needs to pay more attention in class.",
            "Fair effort. Should complete assignments on time.",
            "Can improve with more reading at home.",
        ],
        (Teacher, Forty) => &[
            "Easily distracted. Needs closer supervision.",
            "Must take studies more seriously.",
            "Needs to attend extra lessons.",
        ],
        (Teacher, Thirty) => &[
            "Struggling with most subjects. Needs support.",
            "Lacks concentration in class.",
            "Should be helped with a regular study timetable.",
        ],
        (Teacher, Below) => &[
            "Requires urgent academic support.",
            "Rarely completes class work. Parents should follow up.",
            "Needs a great deal of encouragement and help.",
        ],
    }
}

/// Draws one phrasing for `band` from the `author`'s pool.
pub fn pick_remark<R: Rng + ?Sized>(
    author: RemarkAuthor,
    band: RemarkBand,
    rng: &mut R,
) -> &'static str {
    let candidates = pool(author, band);
    candidates.choose(rng).copied().unwrap_or(candidates[0])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRemarks {
    pub principal: String,
    pub teacher: String,
}

pub fn remarks_for_average<R: Rng + ?Sized>(term_average: f64, rng: &mut R) -> SummaryRemarks {
    let band = RemarkBand::for_average(term_average);
    SummaryRemarks {
        principal: pick_remark(RemarkAuthor::Principal, band, rng).to_string(),
        teacher: pick_remark(RemarkAuthor::Teacher, band, rng).to_string(),
    }
}
