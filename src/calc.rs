use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

pub const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub const DAYS_SUNDAY_FIRST: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

pub const DAYS_MONDAY_FIRST: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

pub const PAYMENT_METHODS: [&str; 5] = ["cash", "upi", "bank_transfer", "cheque", "fawran"];

/// Fixed QAR to INR conversion used for the rupee-equivalent figures in
/// report payloads. There is no market-rate fetching.
pub const QAR_TO_INR_RATE: f64 = 24.95010;

pub fn qar_to_inr(amount: i64) -> i64 {
    ((amount as f64) * QAR_TO_INR_RATE).round() as i64
}

pub fn month_index(name: &str) -> Option<usize> {
    MONTHS.iter().position(|m| *m == name)
}

pub fn day_index_monday_first(day: &str) -> Option<usize> {
    DAYS_MONDAY_FIRST.iter().position(|d| *d == day)
}

pub fn method_label(method: &str) -> &str {
    match method {
        "cash" => "Cash",
        "upi" => "UPI",
        "bank_transfer" => "Bank Transfer",
        "cheque" => "Cheque",
        "fawran" => "Fawran",
        other => other,
    }
}

/// Bucket a schedule by its start hour: [00,12) Morning, [12,17) Afternoon,
/// [17,24) Evening. Times are "HH:MM" strings.
pub fn time_slot(start_time: &str) -> &'static str {
    let hour: u32 = start_time
        .split(':')
        .next()
        .and_then(|h| h.parse().ok())
        .unwrap_or(0);
    if hour < 12 {
        "Morning"
    } else if hour < 17 {
        "Afternoon"
    } else {
        "Evening"
    }
}

/// Percentage of expected revenue actually collected, rounded to the nearest
/// whole percent. Zero expected means a rate of 0, not a division error.
pub fn collection_rate(collected: i64, expected: i64) -> i64 {
    if expected <= 0 {
        return 0;
    }
    (100.0 * collected as f64 / expected as f64).round() as i64
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub grade: Option<String>,
    pub subject: String,
    pub monthly_fee: i64,
    pub status: String,
    pub family_name: Option<String>,
}

impl Student {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub id: i64,
    pub student_id: i64,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    pub subject: String,
}

#[derive(Debug, Clone)]
pub struct Payment {
    pub id: i64,
    pub student_id: i64,
    pub amount: i64,
    pub month: String,
    pub year: i64,
    pub paid_date: String,
    pub method: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FeeOverride {
    pub id: i64,
    pub student_id: i64,
    pub month: String,
    pub year: i64,
    pub amount: i64,
}

/// Point-in-time copy of the full entity store. Every report model is
/// recomputed from a fresh load; nothing is cached between calls.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub students: Vec<Student>,
    pub schedules: Vec<Schedule>,
    pub payments: Vec<Payment>,
    pub fees: Vec<FeeOverride>,
}

impl Roster {
    pub fn load(conn: &Connection) -> Result<Roster, CalcError> {
        let map_err = |e: rusqlite::Error| CalcError::new("db_query_failed", e.to_string());

        let mut stmt = conn
            .prepare(
                "SELECT id, name, phone, email, grade, subject, monthly_fee, status, family_name
                 FROM students ORDER BY id",
            )
            .map_err(map_err)?;
        let students = stmt
            .query_map([], |r| {
                Ok(Student {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    phone: r.get(2)?,
                    email: r.get(3)?,
                    grade: r.get(4)?,
                    subject: r.get(5)?,
                    monthly_fee: r.get(6)?,
                    status: r.get(7)?,
                    family_name: r.get(8)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(map_err)?;

        let mut stmt = conn
            .prepare(
                "SELECT id, student_id, day_of_week, start_time, end_time, subject
                 FROM schedules ORDER BY id",
            )
            .map_err(map_err)?;
        let schedules = stmt
            .query_map([], |r| {
                Ok(Schedule {
                    id: r.get(0)?,
                    student_id: r.get(1)?,
                    day_of_week: r.get(2)?,
                    start_time: r.get(3)?,
                    end_time: r.get(4)?,
                    subject: r.get(5)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(map_err)?;

        let mut stmt = conn
            .prepare(
                "SELECT id, student_id, amount, month, year, paid_date, method, notes
                 FROM payments ORDER BY id",
            )
            .map_err(map_err)?;
        let payments = stmt
            .query_map([], |r| {
                Ok(Payment {
                    id: r.get(0)?,
                    student_id: r.get(1)?,
                    amount: r.get(2)?,
                    month: r.get(3)?,
                    year: r.get(4)?,
                    paid_date: r.get(5)?,
                    method: r.get(6)?,
                    notes: r.get(7)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(map_err)?;

        let mut stmt = conn
            .prepare(
                "SELECT id, student_id, month, year, amount
                 FROM student_fees ORDER BY id",
            )
            .map_err(map_err)?;
        let fees = stmt
            .query_map([], |r| {
                Ok(FeeOverride {
                    id: r.get(0)?,
                    student_id: r.get(1)?,
                    month: r.get(2)?,
                    year: r.get(3)?,
                    amount: r.get(4)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(map_err)?;

        Ok(Roster {
            students,
            schedules,
            payments,
            fees,
        })
    }

    /// The fee actually owed by a student for a month: the override amount
    /// when one matches (month name compared case-sensitively, year exactly),
    /// else the student's default monthly fee. An override of 0 is a real
    /// state ("no fee this month"), distinct from "no override".
    pub fn effective_fee(&self, student_id: i64, month: &str, year: i64) -> i64 {
        if let Some(f) = self
            .fees
            .iter()
            .find(|f| f.student_id == student_id && f.month == month && f.year == year)
        {
            return f.amount;
        }
        self.students
            .iter()
            .find(|s| s.id == student_id)
            .map(|s| s.monthly_fee)
            .unwrap_or(0)
    }

    pub fn student_name(&self, student_id: i64) -> String {
        self.students
            .iter()
            .find(|s| s.id == student_id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    fn paid_student_ids(&self, month: &str, year: i64) -> HashSet<i64> {
        self.payments
            .iter()
            .filter(|p| p.month == month && p.year == year)
            .map(|p| p.student_id)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PaymentStatus {
    Paid,
    Pending,
    #[serde(rename = "No Fee")]
    NoFee,
    #[serde(rename = "N/A")]
    NotApplicable,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayClass {
    pub schedule_id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub subject: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingStudent {
    pub student_id: i64,
    pub name: String,
    pub subject: String,
    pub amount_due: i64,
    pub amount_due_inr: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardModel {
    pub today: String,
    pub month: String,
    pub year: i64,
    pub active_students: usize,
    pub today_classes: Vec<TodayClass>,
    pub total_collected: i64,
    pub total_collected_inr: i64,
    pub total_expected: i64,
    pub total_expected_inr: i64,
    pub pending_students: Vec<PendingStudent>,
}

/// Dashboard snapshot for a reference date. Expected revenue and the pending
/// list use the effective fee and exclude zero-fee students, the same
/// definition the report models use.
pub fn compute_dashboard(roster: &Roster, today: &str, month: &str, year: i64) -> DashboardModel {
    let active: Vec<&Student> = roster.students.iter().filter(|s| s.is_active()).collect();

    let mut today_classes: Vec<TodayClass> = roster
        .schedules
        .iter()
        .filter(|sc| sc.day_of_week == today)
        .map(|sc| TodayClass {
            schedule_id: sc.id,
            student_id: sc.student_id,
            student_name: roster.student_name(sc.student_id),
            subject: sc.subject.clone(),
            start_time: sc.start_time.clone(),
            end_time: sc.end_time.clone(),
        })
        .collect();
    today_classes.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then(a.schedule_id.cmp(&b.schedule_id))
    });

    let total_collected: i64 = roster
        .payments
        .iter()
        .filter(|p| p.month == month && p.year == year)
        .map(|p| p.amount)
        .sum();

    let total_expected: i64 = active
        .iter()
        .map(|s| roster.effective_fee(s.id, month, year))
        .filter(|fee| *fee > 0)
        .sum();

    let paid_ids = roster.paid_student_ids(month, year);
    let pending_students: Vec<PendingStudent> = active
        .iter()
        .filter(|s| !paid_ids.contains(&s.id))
        .filter_map(|s| {
            let due = roster.effective_fee(s.id, month, year);
            if due <= 0 {
                return None;
            }
            Some(PendingStudent {
                student_id: s.id,
                name: s.name.clone(),
                subject: s.subject.clone(),
                amount_due: due,
                amount_due_inr: qar_to_inr(due),
            })
        })
        .collect();

    DashboardModel {
        today: today.to_string(),
        month: month.to_string(),
        year,
        active_students: active.len(),
        today_classes,
        total_collected,
        total_collected_inr: qar_to_inr(total_collected),
        total_expected,
        total_expected_inr: qar_to_inr(total_expected),
        pending_students,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFeeRow {
    pub student_id: i64,
    pub name: String,
    pub subject: String,
    pub grade: Option<String>,
    pub status: String,
    pub family_name: Option<String>,
    pub default_fee: i64,
    pub effective_fee: i64,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReportModel {
    pub month: String,
    pub year: i64,
    pub total_students: usize,
    pub active_count: usize,
    pub inactive_count: usize,
    pub fee_bearing_count: usize,
    pub subjects: Vec<NameCount>,
    pub grades: Vec<NameCount>,
    pub avg_fee: i64,
    pub avg_fee_inr: i64,
    pub expected_monthly: i64,
    pub expected_monthly_inr: i64,
    pub students: Vec<StudentFeeRow>,
}

pub fn compute_student_report(roster: &Roster, month: &str, year: i64) -> StudentReportModel {
    let active_count = roster.students.iter().filter(|s| s.is_active()).count();
    let inactive_count = roster.students.len() - active_count;

    let mut subject_map: BTreeMap<&str, usize> = BTreeMap::new();
    for s in &roster.students {
        *subject_map.entry(s.subject.as_str()).or_default() += 1;
    }
    let mut subjects: Vec<NameCount> = subject_map
        .into_iter()
        .map(|(name, count)| NameCount {
            name: name.to_string(),
            count,
        })
        .collect();
    subjects.sort_by(|a, b| b.count.cmp(&a.count).then(a.name.cmp(&b.name)));

    let mut grade_map: BTreeMap<&str, usize> = BTreeMap::new();
    for s in &roster.students {
        if let Some(g) = s.grade.as_deref() {
            *grade_map.entry(g).or_default() += 1;
        }
    }
    let grades: Vec<NameCount> = grade_map
        .into_iter()
        .map(|(name, count)| NameCount {
            name: name.to_string(),
            count,
        })
        .collect();

    // Revenue figures count only active students actually owing something
    // this month; zero-fee students are listed but contribute nothing.
    let fee_bearing: Vec<i64> = roster
        .students
        .iter()
        .filter(|s| s.is_active())
        .map(|s| roster.effective_fee(s.id, month, year))
        .filter(|fee| *fee > 0)
        .collect();
    let expected_monthly: i64 = fee_bearing.iter().sum();
    let avg_fee = if fee_bearing.is_empty() {
        0
    } else {
        (expected_monthly as f64 / fee_bearing.len() as f64).round() as i64
    };

    let paid_ids = roster.paid_student_ids(month, year);
    let mut rows: Vec<StudentFeeRow> = roster
        .students
        .iter()
        .map(|s| {
            let fee = roster.effective_fee(s.id, month, year);
            let payment_status = if paid_ids.contains(&s.id) {
                PaymentStatus::Paid
            } else if s.is_active() && fee > 0 {
                PaymentStatus::Pending
            } else if s.is_active() {
                PaymentStatus::NoFee
            } else {
                PaymentStatus::NotApplicable
            };
            StudentFeeRow {
                student_id: s.id,
                name: s.name.clone(),
                subject: s.subject.clone(),
                grade: s.grade.clone(),
                status: s.status.clone(),
                family_name: s.family_name.clone(),
                default_fee: s.monthly_fee,
                effective_fee: fee,
                payment_status,
            }
        })
        .collect();
    // Active students first, alphabetical within each status.
    rows.sort_by(|a, b| {
        let rank = |st: &str| if st == "active" { 0 } else { 1 };
        rank(&a.status)
            .cmp(&rank(&b.status))
            .then_with(|| a.name.cmp(&b.name))
    });

    StudentReportModel {
        month: month.to_string(),
        year,
        total_students: roster.students.len(),
        active_count,
        inactive_count,
        fee_bearing_count: fee_bearing.len(),
        subjects,
        grades,
        avg_fee,
        avg_fee_inr: qar_to_inr(avg_fee),
        expected_monthly,
        expected_monthly_inr: qar_to_inr(expected_monthly),
        students: rows,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCount {
    pub day: String,
    pub classes: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusiestDay {
    pub day: String,
    pub classes: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentLoadRow {
    pub student_id: i64,
    pub name: String,
    pub subject: String,
    pub classes: usize,
    pub days: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleReportModel {
    pub total_classes: usize,
    pub teaching_days: usize,
    pub busiest_day: BusiestDay,
    pub per_day: Vec<DayCount>,
    pub subjects: Vec<NameCount>,
    pub time_slots: Vec<NameCount>,
    pub per_student: Vec<StudentLoadRow>,
}

pub fn compute_schedule_report(roster: &Roster) -> ScheduleReportModel {
    let per_day: Vec<DayCount> = DAYS_SUNDAY_FIRST
        .iter()
        .map(|day| DayCount {
            day: day.to_string(),
            classes: roster
                .schedules
                .iter()
                .filter(|sc| sc.day_of_week == *day)
                .count(),
        })
        .collect();
    let teaching_days = per_day.iter().filter(|d| d.classes > 0).count();
    // First day reaching the maximum wins ties.
    let busiest = per_day
        .iter()
        .fold(&per_day[0], |max, d| if d.classes > max.classes { d } else { max });
    let busiest_day = BusiestDay {
        day: busiest.day.clone(),
        classes: busiest.classes,
    };

    let mut subject_map: BTreeMap<&str, usize> = BTreeMap::new();
    for sc in &roster.schedules {
        *subject_map.entry(sc.subject.as_str()).or_default() += 1;
    }
    let mut subjects: Vec<NameCount> = subject_map
        .into_iter()
        .map(|(name, count)| NameCount {
            name: name.to_string(),
            count,
        })
        .collect();
    subjects.sort_by(|a, b| b.count.cmp(&a.count).then(a.name.cmp(&b.name)));

    let time_slots: Vec<NameCount> = ["Morning", "Afternoon", "Evening"]
        .iter()
        .map(|label| NameCount {
            name: label.to_string(),
            count: roster
                .schedules
                .iter()
                .filter(|sc| time_slot(&sc.start_time) == *label)
                .count(),
        })
        .collect();

    let per_student: Vec<StudentLoadRow> = roster
        .students
        .iter()
        .filter_map(|s| {
            let mine: Vec<&Schedule> = roster
                .schedules
                .iter()
                .filter(|sc| sc.student_id == s.id)
                .collect();
            if mine.is_empty() {
                return None;
            }
            let mut days: Vec<String> = mine
                .iter()
                .map(|sc| sc.day_of_week.clone())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            days.sort_by_key(|d| day_index_monday_first(d).unwrap_or(usize::MAX));
            Some(StudentLoadRow {
                student_id: s.id,
                name: s.name.clone(),
                subject: s.subject.clone(),
                classes: mine.len(),
                days,
            })
        })
        .collect();

    ScheduleReportModel {
        total_classes: roster.schedules.len(),
        teaching_days,
        busiest_day,
        per_day,
        subjects,
        time_slots,
        per_student,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthSeriesRow {
    pub month: String,
    pub collected: i64,
    pub expected: i64,
    pub payments: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodAmount {
    pub name: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHistoryRow {
    pub payment_id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub month: String,
    pub amount: i64,
    pub amount_inr: i64,
    pub method: String,
    pub paid_date: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReportModel {
    pub year: i64,
    pub month: String,
    pub monthly: Vec<MonthSeriesRow>,
    pub total_collected: i64,
    pub total_collected_inr: i64,
    pub total_expected: i64,
    pub total_expected_inr: i64,
    pub collection_rate: i64,
    pub total_payments: usize,
    pub methods_by_count: Vec<NameCount>,
    pub methods_by_amount: Vec<MethodAmount>,
    pub paid_count: usize,
    pub pending_count: usize,
    pub no_fee_count: usize,
    pub history: Vec<PaymentHistoryRow>,
}

/// Expected revenue for one month: effective fees of active students,
/// zero-fee students excluded.
fn monthly_expected(roster: &Roster, month: &str, year: i64) -> i64 {
    roster
        .students
        .iter()
        .filter(|s| s.is_active())
        .map(|s| roster.effective_fee(s.id, month, year))
        .filter(|fee| *fee > 0)
        .sum()
}

pub fn compute_payment_report(roster: &Roster, year: i64, status_month: &str) -> PaymentReportModel {
    let year_payments: Vec<&Payment> =
        roster.payments.iter().filter(|p| p.year == year).collect();

    let monthly: Vec<MonthSeriesRow> = MONTHS
        .iter()
        .map(|month| {
            let pays: Vec<&&Payment> =
                year_payments.iter().filter(|p| p.month == *month).collect();
            MonthSeriesRow {
                month: month.to_string(),
                collected: pays.iter().map(|p| p.amount).sum(),
                expected: monthly_expected(roster, month, year),
                payments: pays.len(),
            }
        })
        .collect();

    let total_collected: i64 = year_payments.iter().map(|p| p.amount).sum();
    let total_expected: i64 = monthly.iter().map(|m| m.expected).sum();

    let methods_by_count: Vec<NameCount> = PAYMENT_METHODS
        .iter()
        .filter_map(|m| {
            let count = year_payments.iter().filter(|p| p.method == *m).count();
            if count == 0 {
                return None;
            }
            Some(NameCount {
                name: method_label(m).to_string(),
                count,
            })
        })
        .collect();
    let methods_by_amount: Vec<MethodAmount> = PAYMENT_METHODS
        .iter()
        .filter_map(|m| {
            let amount: i64 = year_payments
                .iter()
                .filter(|p| p.method == *m)
                .map(|p| p.amount)
                .sum();
            if amount == 0 {
                return None;
            }
            Some(MethodAmount {
                name: method_label(m).to_string(),
                amount,
            })
        })
        .collect();

    let paid_ids = roster.paid_student_ids(status_month, year);
    let mut paid_count = 0usize;
    let mut pending_count = 0usize;
    let mut no_fee_count = 0usize;
    for s in roster.students.iter().filter(|s| s.is_active()) {
        let fee = roster.effective_fee(s.id, status_month, year);
        if fee > 0 {
            if paid_ids.contains(&s.id) {
                paid_count += 1;
            } else {
                pending_count += 1;
            }
        } else {
            no_fee_count += 1;
        }
    }

    let mut history: Vec<PaymentHistoryRow> = year_payments
        .iter()
        .map(|p| PaymentHistoryRow {
            payment_id: p.id,
            student_id: p.student_id,
            student_name: roster.student_name(p.student_id),
            month: p.month.clone(),
            amount: p.amount,
            amount_inr: qar_to_inr(p.amount),
            method: p.method.clone(),
            paid_date: p.paid_date.clone(),
            notes: p.notes.clone(),
        })
        .collect();
    // Latest month first, then latest paid date; ids keep the order stable.
    history.sort_by(|a, b| {
        let ma = month_index(&a.month).map(|i| i as i64).unwrap_or(-1);
        let mb = month_index(&b.month).map(|i| i as i64).unwrap_or(-1);
        mb.cmp(&ma)
            .then_with(|| b.paid_date.cmp(&a.paid_date))
            .then_with(|| a.payment_id.cmp(&b.payment_id))
    });

    PaymentReportModel {
        year,
        month: status_month.to_string(),
        monthly,
        total_collected,
        total_collected_inr: qar_to_inr(total_collected),
        total_expected,
        total_expected_inr: qar_to_inr(total_expected),
        collection_rate: collection_rate(total_collected, total_expected),
        total_payments: year_payments.len(),
        methods_by_count,
        methods_by_amount,
        paid_count,
        pending_count,
        no_fee_count,
        history,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyMemberRow {
    pub student_id: i64,
    pub name: String,
    pub effective_fee: i64,
    pub paid: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyRow {
    pub family_name: String,
    pub member_names: Vec<String>,
    pub member_count: usize,
    pub active_members: usize,
    pub expected: i64,
    pub expected_inr: i64,
    pub paid: i64,
    pub paid_inr: i64,
    pub balance: i64,
    pub balance_status: String,
    pub all_paid: bool,
    pub members: Vec<FamilyMemberRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyReportModel {
    pub month: String,
    pub year: i64,
    pub total_families: usize,
    pub fully_paid_families: usize,
    pub unassigned_students: usize,
    pub total_expected: i64,
    pub total_expected_inr: i64,
    pub total_paid: i64,
    pub total_paid_inr: i64,
    pub families: Vec<FamilyRow>,
}

pub fn compute_family_report(roster: &Roster, month: &str, year: i64) -> FamilyReportModel {
    let mut family_map: BTreeMap<String, Vec<&Student>> = BTreeMap::new();
    let mut unassigned = 0usize;
    for s in &roster.students {
        match s.family_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => {
                family_map.entry(name.to_string()).or_default().push(s)
            }
            _ => unassigned += 1,
        }
    }

    let paid_ids = roster.paid_student_ids(month, year);
    let families: Vec<FamilyRow> = family_map
        .into_iter()
        .map(|(family_name, members)| {
            let active: Vec<&&Student> = members.iter().filter(|m| m.is_active()).collect();
            let fee_bearing: Vec<FamilyMemberRow> = active
                .iter()
                .filter_map(|m| {
                    let fee = roster.effective_fee(m.id, month, year);
                    if fee <= 0 {
                        return None;
                    }
                    Some(FamilyMemberRow {
                        student_id: m.id,
                        name: m.name.clone(),
                        effective_fee: fee,
                        paid: paid_ids.contains(&m.id),
                    })
                })
                .collect();
            let expected: i64 = fee_bearing.iter().map(|m| m.effective_fee).sum();
            let paid: i64 = roster
                .payments
                .iter()
                .filter(|p| {
                    p.month == month
                        && p.year == year
                        && members.iter().any(|m| m.id == p.student_id)
                })
                .map(|p| p.amount)
                .sum();
            // A family is fully paid when it has active members and every
            // fee-bearing one has at least one payment this month.
            let all_paid = !active.is_empty() && fee_bearing.iter().all(|m| m.paid);
            let balance = expected - paid;
            let balance_status = if balance > 0 {
                "Due"
            } else if balance == 0 {
                "Settled"
            } else {
                "Overpaid"
            };
            FamilyRow {
                family_name,
                member_names: members.iter().map(|m| m.name.clone()).collect(),
                member_count: members.len(),
                active_members: active.len(),
                expected,
                expected_inr: qar_to_inr(expected),
                paid,
                paid_inr: qar_to_inr(paid),
                balance,
                balance_status: balance_status.to_string(),
                all_paid,
                members: fee_bearing,
            }
        })
        .collect();

    let total_expected: i64 = families.iter().map(|f| f.expected).sum();
    let total_paid: i64 = families.iter().map(|f| f.paid).sum();
    let fully_paid_families = families.iter().filter(|f| f.all_paid).count();

    FamilyReportModel {
        month: month.to_string(),
        year,
        total_families: families.len(),
        fully_paid_families,
        unassigned_students: unassigned,
        total_expected,
        total_expected_inr: qar_to_inr(total_expected),
        total_paid,
        total_paid_inr: qar_to_inr(total_paid),
        families,
    }
}
