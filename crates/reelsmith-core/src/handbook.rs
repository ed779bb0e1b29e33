//! Coding handbook for the generation agent and the locale message catalog.
//!
//! Every prompt and user-facing phase label comes from here, parameterised by
//! [`Locale`], so agents and the coordinator have a single implementation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::MAX_DURATION_MINUTES;

/// One worked example the model is asked to imitate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkedExample {
    pub title: &'static str,
    pub code: &'static str,
}

/// Fixed rules and examples constraining generated animation code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handbook {
    pub rules: Vec<String>,
    pub examples: Vec<WorkedExample>,
}

impl Handbook {
    pub fn manim_community() -> Self {
        let rules = [
            "Use only features of Manim Community 0.18.1 with numpy >=1.23,<2.0; start the file with `from manim import *`.",
            "Declare exactly one scene class deriving from `Scene` and put all animation in its `construct(self)` method.",
            "Always position objects explicitly with `.to_edge()`, `.next_to()` or `.move_to()`; never rely on default placement.",
            "Prefer `Succession` for sequential animations instead of long chains of separate `self.play` calls.",
            "For non-Latin text (for example Vietnamese) build a `TexTemplate` with the `xelatex` compiler and a Unicode font and pass it to every `Tex`/`MathTex`.",
            "Use the scene timings from the visual direction to choose `run_time` values, and add `self.wait()` between scenes.",
            "Return the complete program in a single ```python fenced block; never return a diff or a fragment.",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let examples = vec![
            WorkedExample {
                title: "A changing value with a live label",
                code: "number = ValueTracker(0)\n\
                       label = DecimalNumber(number.get_value())\n\
                       label.add_updater(lambda d: d.set_value(number.get_value()))\n\
                       self.play(number.animate.set_value(10), run_time=5)",
            },
            WorkedExample {
                title: "A line that follows a moving point",
                code: "dot = Dot(point=LEFT * 2)\n\
                       line = Line(ORIGIN, dot.get_center())\n\
                       line.add_updater(lambda l: l.put_start_and_end_on(ORIGIN, dot.get_center()))\n\
                       self.play(dot.animate.shift(RIGHT * 4), run_time=3)",
            },
            WorkedExample {
                title: "Grouping objects and animating them together",
                code: "circle = Circle()\n\
                       square = Square()\n\
                       group = VGroup(circle, square).arrange(RIGHT, buff=1)\n\
                       self.play(Create(group))\n\
                       self.play(group.animate.shift(UP * 2).scale(0.5))",
            },
        ];

        Self { rules, examples }
    }

    /// Prompt block with numbered rules followed by the examples.
    pub fn render(&self) -> String {
        let mut out = String::from("--- MANIM HANDBOOK ---\n\n1. RULES:\n");
        for rule in &self.rules {
            out.push_str("- ");
            out.push_str(rule);
            out.push('\n');
        }
        out.push_str("\n2. EXAMPLES TO FOLLOW:\n");
        for (i, example) in self.examples.iter().enumerate() {
            out.push_str(&format!(
                "\nEXAMPLE {}: {}\n```python\n{}\n```\n",
                i + 1,
                example.title,
                example.code
            ));
        }
        out.push_str("\n--- END OF HANDBOOK ---\n");
        out
    }
}

impl Default for Handbook {
    fn default() -> Self {
        Self::manim_community()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Vi,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Locale::En),
            "vi" | "vietnamese" => Ok(Locale::Vi),
            other => Err(format!("unsupported locale: {other}")),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Locale::En => "en",
            Locale::Vi => "vi",
        })
    }
}

/// Pipeline phases with a user-facing label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Queued,
    Script,
    Coding,
    Attempt { attempt: u32, max: u32 },
    Approved,
    Voice,
    Mux,
    Completed,
}

/// Locale-parameterised prompts and labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Catalog {
    locale: Locale,
}

impl Catalog {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn coder_role(&self) -> &'static str {
        match self.locale {
            Locale::En => "You are a meticulous Manim developer. You write high-quality, runnable Manim Python code and follow the handbook below strictly.",
            Locale::Vi => "Bạn là một lập trình viên Manim cẩn thận. Bạn viết mã Python Manim chất lượng cao, chạy được, và tuân thủ nghiêm ngặt sổ tay dưới đây.",
        }
    }

    pub fn coder_task(&self) -> &'static str {
        match self.locale {
            Locale::En => "Write the complete Manim program for the following visual direction. Use the scene timings for run_time values.",
            Locale::Vi => "Viết chương trình Manim hoàn chỉnh cho kịch bản hình ảnh sau. Dùng thời lượng từng cảnh để đặt run_time.",
        }
    }

    /// Wraps the previous attempt's report. Only ever one report.
    pub fn retry_preamble(&self, report: &str) -> String {
        match self.locale {
            Locale::En => format!(
                "Your previous program failed. Read the error report below carefully, diagnose the cause and rewrite the WHOLE program correctly.\n\n--- QA ERROR REPORT ---\n{report}\n--- END OF REPORT ---\n\n"
            ),
            Locale::Vi => format!(
                "Mã nguồn trước đó của bạn đã gặp lỗi khi thực thi. Hãy đọc kỹ báo cáo lỗi dưới đây, phân tích nguyên nhân và viết lại toàn bộ mã cho chính xác.\n\n--- BÁO CÁO LỖI TỪ QA ---\n{report}\n--- HẾT BÁO CÁO LỖI ---\n\n"
            ),
        }
    }

    pub fn storyteller_role(&self) -> &'static str {
        match self.locale {
            Locale::En => "You are an educational video scriptwriter who turns complex concepts into clear stories, with visual descriptions precise enough for a Manim developer to implement.",
            Locale::Vi => "Bạn là nhà biên kịch video giáo dục, biến khái niệm phức tạp thành câu chuyện dễ hiểu, với mô tả hình ảnh đủ rõ để lập trình viên Manim hiện thực hóa.",
        }
    }

    /// Script request sized to `minutes` of video.
    pub fn storyteller_task(&self, topic: &str, language: &str, minutes: u32) -> String {
        let minutes = minutes.clamp(1, MAX_DURATION_MINUTES);
        let (lo, hi) = narration_word_band(minutes);
        let scenes = format!("{}-{}", minutes.saturating_mul(3), minutes.saturating_mul(4));
        let secs = minutes.saturating_mul(60);
        let intro = match self.locale {
            Locale::En => format!(
                "Write a short video script about '{topic}'. Narration language: {language}.\n\nREQUIREMENTS:\n1. [VOICEOVER SCRIPT] must be {lo}-{hi} words.\n2. [VISUAL SCRIPT] must have {scenes} SCENEs with timing.\n3. End with a [TIMING] section with the estimated total duration.\n"
            ),
            Locale::Vi => format!(
                "Viết một kịch bản video ngắn về '{topic}'. Ngôn ngữ lời thoại: {language}.\n\nYÊU CẦU:\n1. [VOICEOVER SCRIPT] dài {lo}-{hi} từ.\n2. [VISUAL SCRIPT] có {scenes} SCENE kèm thời lượng.\n3. Kết thúc bằng phần [TIMING] với tổng thời lượng ước tính.\n"
            ),
        };
        format!(
            "{intro}\nFORMAT:\n[VISUAL SCRIPT]\nSCENE 1 (10s): ...\nSCENE 2 (15s): ...\n\n[VOICEOVER SCRIPT]\n...\n\n[TIMING]\n- Total video duration: ~{secs}s\n"
        )
    }

    pub fn reviewer_role(&self) -> &'static str {
        match self.locale {
            Locale::En => "You are a QA engineer and visual director. You review a rendered animation against its visual script. Reply with the single word SUCCESS if it is acceptable; otherwise explain what is wrong and do not use that word.",
            Locale::Vi => "Bạn là kỹ sư QA kiêm đạo diễn hình ảnh. Bạn đánh giá video đã kết xuất so với kịch bản hình ảnh. Trả lời THÀNH CÔNG nếu đạt yêu cầu; nếu không, hãy giải thích vấn đề và không dùng từ đó.",
        }
    }

    /// Tokens that count as approval, matched case-insensitively as whole words.
    pub fn approval_tokens(&self) -> &'static [&'static str] {
        &["SUCCESS", "APPROVED", "THANH CONG", "THÀNH CÔNG"]
    }

    /// Words that turn a following approval token into a rejection.
    pub fn negations(&self) -> &'static [&'static str] {
        &["not", "no", "never", "không", "khong", "chưa", "chua"]
    }

    pub fn not_approved(&self) -> &'static str {
        match self.locale {
            Locale::En => "The program rendered without errors but the review did not approve the result. Rework the animation so it matches the visual script.",
            Locale::Vi => "Chương trình kết xuất không lỗi nhưng chưa được phê duyệt. Hãy làm lại hoạt ảnh cho khớp với kịch bản hình ảnh.",
        }
    }

    pub fn phase_label(&self, phase: Phase) -> String {
        match (self.locale, phase) {
            (Locale::En, Phase::Queued) => "Queued".into(),
            (Locale::Vi, Phase::Queued) => "Đang chờ".into(),
            (Locale::En, Phase::Script) => "Creating script".into(),
            (Locale::Vi, Phase::Script) => "Đang tạo kịch bản".into(),
            (Locale::En, Phase::Coding) => "Writing Manim code".into(),
            (Locale::Vi, Phase::Coding) => "Đang viết mã Manim".into(),
            (Locale::En, Phase::Attempt { attempt, max }) => format!("Attempt {attempt}/{max}"),
            (Locale::Vi, Phase::Attempt { attempt, max }) => format!("Lần thử {attempt}/{max}"),
            (Locale::En, Phase::Approved) => "Code approved".into(),
            (Locale::Vi, Phase::Approved) => "Mã đã được duyệt".into(),
            (Locale::En, Phase::Voice) => "Creating voiceover".into(),
            (Locale::Vi, Phase::Voice) => "Đang tạo lời thoại".into(),
            (Locale::En, Phase::Mux) => "Merging video & audio".into(),
            (Locale::Vi, Phase::Mux) => "Đang ghép video & âm thanh".into(),
            (Locale::En, Phase::Completed) => "Completed".into(),
            (Locale::Vi, Phase::Completed) => "Hoàn thành".into(),
        }
    }
}

/// Narration word band for a video of `minutes` (130-150 words per minute).
pub fn narration_word_band(minutes: u32) -> (usize, usize) {
    let minutes = minutes.clamp(1, MAX_DURATION_MINUTES) as usize;
    (130 * minutes, 150 * minutes)
}
