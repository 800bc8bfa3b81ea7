use std::fmt::Write;

use leaf_serve::Record;

pub const NO_DATA: &str = "No data available";

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
</head>
<body>
<nav><a href="/">Identify a leaf</a> | <a href="/about">About</a></nav>
{body}
</body>
</html>
"#,
        title = escape(title),
        body = body
    )
}

/// Upload form, optionally with a message about the previous attempt
pub fn index(error_message: Option<&str>) -> String {
    let mut body = String::from("<h1>Medicinal leaf identification</h1>\n");

    if let Some(message) = error_message {
        let _ = writeln!(body, r#"<p class="error">{}</p>"#, escape(message));
    }

    body.push_str(
        r#"<form method="post" action="/" enctype="multipart/form-data">
<input type="file" name="image" accept="image/*" required>
<button type="submit">Identify</button>
</form>"#,
    );

    page("Leaf identification", &body)
}

fn record_table(record: &Record) -> String {
    let mut table = String::from("<table class=\"metadata\">\n");
    for (column, value) in record {
        let _ = writeln!(
            table,
            "<tr><th>{}</th><td>{}</td></tr>",
            escape(column),
            escape(value)
        );
    }
    table.push_str("</table>\n");
    table
}

/// Prediction page with the stored upload and any reference rows
pub fn result(
    class_name: &str,
    confidence: f32,
    data: Option<&[Record]>,
    input_image_path: &str,
) -> String {
    let mut body = String::new();

    let _ = writeln!(
        body,
        r#"<h1>Prediction: <span class="class-name">{}</span></h1>"#,
        escape(class_name)
    );
    let _ = writeln!(
        body,
        r#"<p class="confidence">Confidence: {:.1}%</p>"#,
        confidence * 100.0
    );
    let _ = writeln!(
        body,
        r#"<img src="{}" alt="uploaded leaf" width="224">"#,
        escape(input_image_path)
    );

    match data {
        Some(records) if !records.is_empty() => {
            for record in records {
                body.push_str(&record_table(record));
            }
        }
        _ => {
            let _ = writeln!(body, r#"<p class="no-data">{}</p>"#, NO_DATA);
        }
    }

    body.push_str(r#"<p><a href="/">Try another leaf</a></p>"#);

    page(&format!("{} - Leaf identification", class_name), &body)
}

pub fn about() -> String {
    page(
        "About",
        "<h1>About</h1>\n\
         <p>Upload a photograph of a single leaf and a convolutional neural \
         network trained on 85 Indian medicinal and culinary plant species \
         will name the species. Where available, descriptive information \
         about the plant is shown alongside the prediction.</p>",
    )
}

/// Page shown when the service itself failed
pub fn error_page(message: &str) -> String {
    page(
        "Error",
        &format!(
            "<h1>Something went wrong</h1>\n<p class=\"error\">{}</p>\n<p><a href=\"/\">Back</a></p>",
            escape(message)
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_text_is_escaped() {
        let html = index(Some("<script>alert('x')</script>"));

        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn result_lists_records_in_column_order() {
        let mut record = Record::new();
        record.insert("Common Name".to_owned(), "Tomato".to_owned());
        record.insert("Uses".to_owned(), "Food & salads".to_owned());

        let html = result(
            "Tomato",
            0.93,
            Some(std::slice::from_ref(&record)),
            "/uploads/leaf.png",
        );

        assert!(html.contains(r#"<span class="class-name">Tomato</span>"#));
        assert!(html.contains("Confidence: 93.0%"));
        assert!(html.contains(r#"src="/uploads/leaf.png""#));
        assert!(html.contains("<tr><th>Uses</th><td>Food &amp; salads</td></tr>"));
        assert!(!html.contains(NO_DATA));

        let common = html.find("Common Name").unwrap();
        let uses = html.find("<th>Uses").unwrap();
        assert!(common < uses);
    }

    #[test]
    fn result_without_records_says_so() {
        let html = result("Ganike", 0.5, None, "/uploads/g.png");

        assert!(html.contains(NO_DATA));
        assert!(!html.contains("<table"));
    }
}
