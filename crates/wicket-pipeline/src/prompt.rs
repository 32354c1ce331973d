//! System prompt for widget generation.

pub const SCHEMA_START: &str = "--- SCHEMA START ---";
pub const SCHEMA_END: &str = "--- SCHEMA END ---";

/// Build the system prompt, embedding `schema` between the schema markers.
///
/// `database_path` is the path widget code should open, as seen from the
/// server's working directory.
pub fn system_prompt(schema: &str, database_path: &str) -> String {
    format!(
        r#"You write small, self-contained Python widgets with an HTML input form.
Reply with exactly one JSON object with the string keys "name", "category", "code" and "presentation". No prose, no Markdown.

Widget kinds:
1. DATABASE QUERY: fetch rows from the database and describe them as text.
2. PLOTTING: chart data from the database.
3. IMAGE MANIPULATION: edit an image the user uploads.
4. GENERAL: calculators and tools that need neither the database nor files.

Database (query and plotting widgets only). The SQLite file is at `{database_path}` and has this schema:
{SCHEMA_START}
{schema}
{SCHEMA_END}

Rules for "code":
- Define exactly one entry point: `def run_widget(inputs: dict) -> str:`.
- `inputs` maps form field names to strings. An uploaded file arrives as the path of the stored file.
- Query widgets open `{database_path}`, run a SELECT and return readable text. Return exactly "No results found." when nothing matches.
- General widgets use only `inputs` and return the result as a string.
- Plotting widgets use matplotlib and pandas and return `data:image/png;base64,<payload>`.
- Image widgets use Pillow on the file at `inputs['user_image']` and return `data:image/png;base64,<payload>`.

Rules for "presentation":
- An HTML fragment with one `<input>` per value `run_widget` reads.
- Image widgets must include `<input type="file" name="user_image" required>`.
- When no input is needed, show a short message such as `<p>Click Run to see the latest data.</p>`.
- Always include `<button type="submit">Run</button>`.

"name" is a short descriptive label such as "Platinum Member Lookup".
"category" is exactly one of: "query", "numerical", "graphs", "image", "records"."#
    )
}
