//! Flattened, human-readable view of a submission
//!
//! One or more columns per question in schema order, formatted the way the
//! operator's spreadsheet export shows them.

use crate::answer::{Answer, Answers};
use crate::composite::{CompositeStores, PriceGrid, RefundTier, RoomEntry, Season};
use crate::options::{CompositeKind, FieldKind, ResolvedField};
use crate::question::FormSchema;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryColumn {
    pub step: i32,
    pub order: i32,
    pub header: String,
    pub value: String,
}

pub fn summary_columns(
    schema: &FormSchema,
    answers: &Answers,
    composites: &CompositeStores,
) -> Vec<SummaryColumn> {
    let mut columns = Vec::new();
    for question in schema.questions() {
        let column = |header: &str, value: String| SummaryColumn {
            step: question.step,
            order: question.order,
            header: header.to_string(),
            value,
        };

        let resolved = ResolvedField::for_question(question);
        match resolved.kind {
            FieldKind::Composite(CompositeKind::Rooms) => {
                let rooms = composites.rooms.entries();
                columns.push(column("객실명", join_rooms(rooms, " / ", |r| r.name.clone())));
                columns.push(column("객실설명", join_rooms(rooms, " / ", |r| r.desc.clone())));
                columns.push(column(
                    "기준/최대 인원",
                    join_rooms(rooms, " / ", |r| {
                        format!("{}/{}", r.standard_occupancy, r.max_occupancy)
                    }),
                ));
                columns.push(column("형태", join_rooms(rooms, " / ", |r| r.room_type.clone())));
                for (header, season) in [
                    ("비수기", Season::Low),
                    ("준성수기", Season::Mid),
                    ("성수기", Season::High),
                ] {
                    let prices = join_rooms(rooms, " , ", |r| format_price(r.price(season)));
                    columns.push(column(header, prices));
                }
            }
            FieldKind::Composite(CompositeKind::Specials) => {
                let specials = composites.specials.entries();
                let names = specials.iter().map(|s| s.name.as_str()).collect::<Vec<_>>();
                let descs = specials.iter().map(|s| s.desc.as_str()).collect::<Vec<_>>();
                columns.push(column("스페셜명", names.join(" / ")));
                columns.push(column("스페셜설명", descs.join(" / ")));
            }
            FieldKind::Composite(CompositeKind::Refunds) => {
                let text = composites
                    .refunds
                    .entries()
                    .iter()
                    .enumerate()
                    .filter_map(|(i, tier)| format_refund(i, tier))
                    .collect::<Vec<_>>()
                    .join(", ");
                columns.push(column("환불기준 및 퍼센트", text));
            }
            _ => {
                let value = answers
                    .get(&question.id)
                    .map(format_answer)
                    .unwrap_or_default();
                columns.push(column(&question.title, value));
            }
        }
    }
    columns
}

fn join_rooms(rooms: &[RoomEntry], sep: &str, f: impl Fn(&RoomEntry) -> String) -> String {
    rooms.iter().map(f).collect::<Vec<_>>().join(sep)
}

pub fn format_price(grid: &PriceGrid) -> String {
    format!(
        "평일:{} 금:{} 토:{} 일:{}",
        grid.weekday, grid.fri, grid.sat, grid.sun
    )
}

/// Blank tiers are left out.
pub fn format_refund(index: usize, tier: &RefundTier) -> Option<String> {
    let percent = tier.percent.trim();
    if percent.is_empty() {
        return None;
    }
    Some(match index {
        0 => format!("기본 취소 수수료 {percent}%"),
        1 => format!("방문당일 총 금액의 {percent}% 환불"),
        _ => format!("방문 {}일 전 총 금액의 {percent}% 환불", tier.day.trim()),
    })
}

fn with_extra(label: &str, extra: Option<&String>, spaced: bool) -> String {
    match extra.map(|e| e.trim()).filter(|e| !e.is_empty()) {
        Some(extra) if spaced => format!("{label} ({extra})"),
        Some(extra) => format!("{label}({extra})"),
        None => label.to_string(),
    }
}

fn format_answer(answer: &Answer) -> String {
    match answer {
        Answer::Text(text) => text.clone(),
        Answer::MultiText(lines) => lines.join(", "),
        Answer::Agreement { agreed } => (if *agreed { "동의" } else { "미동의" }).to_string(),
        Answer::CheckboxMulti { checked, inputs } => checked
            .iter()
            .map(|label| with_extra(label, inputs.get(label), false))
            .collect::<Vec<_>>()
            .join(", "),
        Answer::CheckboxSingle { selected, inputs } => selected
            .as_deref()
            .map(|label| with_extra(label, inputs.get(label), true))
            .unwrap_or_default(),
        Answer::CheckboxInput { checked, inputs } => checked
            .iter()
            .filter_map(|idx| inputs.get(*idx))
            .cloned()
            .collect::<Vec<_>>()
            .join(", "),
        Answer::Files(files) => files
            .iter()
            .map(|f| f.name())
            .collect::<Vec<_>>()
            .join(", "),
    }
}
