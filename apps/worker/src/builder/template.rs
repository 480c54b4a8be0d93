//! LaTeX layout for a single-page resume.
//!
//! All user text passes through `escape_latex`; URLs go through `\url{}`
//! which tolerates reserved characters except braces and `%`.

use super::escape::escape_latex;
use super::resume::{Education, Project, ResumeDocument, Work};

const PREAMBLE: &str = r"\documentclass[11pt,letterpaper]{article}
\usepackage[margin=0.6in]{geometry}
\usepackage[T1]{fontenc}
\usepackage[utf8]{inputenc}
\usepackage[hidelinks]{hyperref}
\usepackage{enumitem}
\usepackage{titlesec}
\setlist[itemize]{leftmargin=*,noitemsep,topsep=2pt}
\titleformat{\section}{\large\bfseries}{}{0em}{}[\titlerule]
\titlespacing*{\section}{0pt}{8pt}{4pt}
\pagestyle{empty}
\setlength{\parindent}{0pt}";

pub fn render_latex(doc: &ResumeDocument) -> String {
    let mut lines: Vec<String> = vec![PREAMBLE.to_string(), r"\begin{document}".to_string()];

    lines.extend(header(doc));

    if let Some(summary) = doc.basics.summary.as_deref().filter(|s| !s.trim().is_empty()) {
        lines.push(r"\section*{Summary}".to_string());
        lines.push(escape_latex(summary));
    }

    if !doc.work.is_empty() {
        lines.push(r"\section*{Experience}".to_string());
        for work in &doc.work {
            lines.extend(work_entry(work));
        }
    }

    if !doc.projects.is_empty() {
        lines.push(r"\section*{Projects}".to_string());
        for project in &doc.projects {
            lines.extend(project_entry(project));
        }
    }

    if !doc.education.is_empty() {
        lines.push(r"\section*{Education}".to_string());
        for education in &doc.education {
            lines.extend(education_entry(education));
        }
    }

    if !doc.skills.is_empty() {
        lines.push(r"\section*{Skills}".to_string());
        for group in &doc.skills {
            let keywords: Vec<String> = group.keywords.iter().map(|k| escape_latex(k)).collect();
            lines.push(format!(
                r"\textbf{{{}:}} {}\\",
                escape_latex(&group.name),
                keywords.join(", ")
            ));
        }
    }

    lines.push(r"\end{document}".to_string());
    lines.join("\n") + "\n"
}

fn header(doc: &ResumeDocument) -> Vec<String> {
    let basics = &doc.basics;
    let mut lines = vec![
        r"\begin{center}".to_string(),
        format!(r"{{\LARGE\bfseries {}}}\\", escape_latex(&basics.name)),
    ];
    if let Some(label) = basics.label.as_deref() {
        lines.push(format!(r"{}\\", escape_latex(label)));
    }

    let mut contact = vec![format!(
        r"\href{{mailto:{0}}}{{{0}}}",
        escape_latex(&basics.contact.email)
    )];
    contact.extend(basics.contact.phone.as_deref().map(escape_latex));
    contact.extend(basics.contact.location.as_deref().map(escape_latex));
    contact.extend(
        basics
            .profiles
            .iter()
            .map(|p| format!(r"\href{{{}}}{{{}}}", url(&p.url), escape_latex(&p.network))),
    );
    lines.push(contact.join(r" $\cdot$ "));
    lines.push(r"\end{center}".to_string());
    lines
}

fn work_entry(work: &Work) -> Vec<String> {
    let mut lines = vec![
        format!(
            r"\textbf{{{}}} \hfill {}\\",
            escape_latex(&work.position),
            date_range(Some(&work.start_date), work.end_date.as_deref())
        ),
        format!(
            r"\textit{{{}}} \hfill {}",
            escape_latex(&work.company),
            work.location.as_deref().map(escape_latex).unwrap_or_default()
        ),
    ];
    lines.extend(itemize(&work.highlights));
    lines
}

fn project_entry(project: &Project) -> Vec<String> {
    let title = match project.url.as_deref() {
        Some(link) => format!(
            r"\href{{{}}}{{\textbf{{{}}}}}",
            url(link),
            escape_latex(&project.name)
        ),
        None => format!(r"\textbf{{{}}}", escape_latex(&project.name)),
    };
    let mut lines = vec![match project.description.as_deref() {
        Some(description) => format!(r"{title} -- {}\\", escape_latex(description)),
        None => format!(r"{title}\\"),
    }];
    lines.extend(itemize(&project.highlights));
    lines
}

fn education_entry(education: &Education) -> Vec<String> {
    let mut degree = escape_latex(&education.degree);
    if let Some(area) = education.area.as_deref() {
        degree = format!("{degree}, {}", escape_latex(area));
    }
    if let Some(score) = education.score.as_deref() {
        degree = format!("{degree} ({})", escape_latex(score));
    }
    vec![
        format!(
            r"\textbf{{{}}} \hfill {}\\",
            escape_latex(&education.institution),
            date_range(education.start_date.as_deref(), education.end_date.as_deref())
        ),
        format!(r"{degree}\\[2pt]"),
    ]
}

fn itemize(items: &[String]) -> Vec<String> {
    if items.is_empty() {
        return vec![];
    }
    let mut lines = vec![r"\begin{itemize}".to_string()];
    lines.extend(items.iter().map(|item| format!(r"\item {}", escape_latex(item))));
    lines.push(r"\end{itemize}".to_string());
    lines
}

fn date_range(start: Option<&str>, end: Option<&str>) -> String {
    match (start, end) {
        (Some(start), Some(end)) => format!("{} -- {}", escape_latex(start), escape_latex(end)),
        (Some(start), None) => format!("{} -- Present", escape_latex(start)),
        (None, Some(end)) => escape_latex(end),
        (None, None) => String::new(),
    }
}

/// `\url`/`\href` targets: only `%`, `#`, `{`, `}` need escaping.
fn url(link: &str) -> String {
    link.replace('%', r"\%")
        .replace('#', r"\#")
        .replace('{', r"\{")
        .replace('}', r"\}")
}
