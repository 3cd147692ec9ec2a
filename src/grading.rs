/// Grade bands, checked top-down; the first band whose floor the total reaches wins.
pub const GRADE_BANDS: [(i64, &str, &str); 9] = [
    (95, "A+", "Outstanding"),
    (80, "A", "Excellent"),
    (70, "B+", "Very Good"),
    (65, "B", "Good"),
    (60, "C+", "Credit"),
    (50, "C", "Credit"),
    (40, "D", "Poor"),
    (30, "E", "Very Poor"),
    (i64::MIN, "F", "Failed"),
];

pub fn grade_and_remark(total: Option<i64>) -> (Option<&'static str>, Option<&'static str>) {
    let Some(total) = total else {
        return (None, None);
    };
    for (floor, grade, remark) in GRADE_BANDS {
        if total >= floor {
            return (Some(grade), Some(remark));
        }
    }
    // The last band has no floor.
    (Some("F"), Some("Failed"))
}
