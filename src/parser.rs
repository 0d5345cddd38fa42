//! QA要求テーブルのHTMLパース
//!
//! レコードページHTMLからQA要求事項マッピングを取り出す純関数。
//! 対象テーブルが無いページも正常系（空マッピングを返す）。

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::model::{QaRequirements, QaValue};

/// QA要求セクションのテーブルID
const QA_TABLE_SELECTOR: &str = "table#sect_s3";

struct QaSelectors {
    table: Selector,
    row: Selector,
    cell: Selector,
    field_label: Selector,
    checkmark: Selector,
}

impl QaSelectors {
    fn build() -> Option<Self> {
        Some(Self {
            table: Selector::parse(QA_TABLE_SELECTOR).ok()?,
            row: Selector::parse("tr.formRow").ok()?,
            cell: Selector::parse("td").ok()?,
            field_label: Selector::parse("label.fieldLabel").ok()?,
            checkmark: Selector::parse(r#"img[alt="Yes"]"#).ok()?,
        })
    }
}

/// レコードページHTMLからQA要求事項を抽出する
///
/// テーブルの各行を左から右に走査する。`label`クラス付きセルは
/// テキスト項目で、直後の`cell`クラスセルの文字列が値。`label`クラスの
/// 無いラベルセルはチェックボックス項目で、`img[alt="Yes"]`の有無がbool値。
/// 形の合わない行・セルは読み飛ばす。
pub fn parse_qa_requirements(html: &str) -> QaRequirements {
    let mut qa = QaRequirements::new();

    let Some(selectors) = QaSelectors::build() else {
        return qa;
    };

    let document = Html::parse_document(html);
    let Some(table) = document.select(&selectors.table).next() else {
        debug!("QA table ({}) not found in page", QA_TABLE_SELECTOR);
        return qa;
    };

    for row in table.select(&selectors.row) {
        let cells: Vec<ElementRef> = row.select(&selectors.cell).collect();
        let mut i = 0;
        while i < cells.len() {
            let cell = cells[i];
            if let Some(label_el) = cell.select(&selectors.field_label).next() {
                let label_text = collapse_text(label_el);
                if !label_text.is_empty() {
                    if has_class(cell, "label") {
                        // テキスト項目: 次のセルが値
                        i += 1;
                        if let Some(content) = cells.get(i) {
                            if has_class(*content, "cell") {
                                qa.insert(label_text, QaValue::Text(collapse_text(*content)));
                            }
                        }
                    } else {
                        // チェックボックス項目
                        let checked = cell.select(&selectors.checkmark).next().is_some();
                        qa.insert(label_text, QaValue::Flag(checked));
                    }
                }
            }
            i += 1;
        }
    }

    qa
}

/// 子孫テキストを空白除去して連結する
fn collapse_text(el: ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

fn has_class(el: ElementRef, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}
