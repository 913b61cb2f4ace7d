use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::MockExamQuestion;

pub(crate) const COLUMNS: &str = "\
    id, type1, type2, type3, source_year, source_month, source_grade, source_org, source_number, \
    question_number, question_text, passage, choice_1, choice_2, choice_3, choice_4, choice_5, \
    correct_answer, model_translation, image_path, pdf_filename, created_at";

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct NewQuestion {
    pub(crate) type1: String,
    pub(crate) type2: String,
    pub(crate) type3: String,
    pub(crate) source_year: Option<i32>,
    pub(crate) source_month: Option<String>,
    pub(crate) source_grade: Option<String>,
    pub(crate) source_org: Option<String>,
    pub(crate) source_number: Option<i32>,
    pub(crate) question_number: i32,
    pub(crate) question_text: String,
    pub(crate) passage: String,
    pub(crate) choices: [String; 5],
    pub(crate) correct_answer: String,
    pub(crate) model_translation: String,
    pub(crate) image_path: Option<String>,
    pub(crate) pdf_filename: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct QuestionFilter {
    pub(crate) type1: Option<String>,
    pub(crate) type2: Option<String>,
    pub(crate) type3: Option<String>,
    pub(crate) source_grade: Option<String>,
    pub(crate) source_year: Option<i32>,
    pub(crate) source_org: Option<String>,
    pub(crate) pdf_filename: Option<String>,
    pub(crate) search: Option<String>,
}

pub(crate) struct UpdateQuestion<'a> {
    pub(crate) question_text: Option<&'a str>,
    pub(crate) passage: Option<&'a str>,
    pub(crate) choices: [Option<&'a str>; 5],
    pub(crate) correct_answer: Option<&'a str>,
    pub(crate) model_translation: Option<&'a str>,
}

#[derive(Debug, Default)]
pub(crate) struct FilterOptions {
    pub(crate) type1: Vec<String>,
    pub(crate) type2: Vec<String>,
    pub(crate) type3: Vec<String>,
    pub(crate) source_grade: Vec<String>,
    pub(crate) source_year: Vec<i32>,
    pub(crate) source_org: Vec<String>,
    pub(crate) pdf_filename: Vec<String>,
}

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    question: &NewQuestion,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO mock_exam_questions (
            id, type1, type2, type3, source_year, source_month, source_grade, source_org,
            source_number, question_number, question_text, passage, choice_1, choice_2,
            choice_3, choice_4, choice_5, correct_answer, model_translation, image_path,
            pdf_filename, created_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22)",
    )
    .bind(id)
    .bind(&question.type1)
    .bind(&question.type2)
    .bind(&question.type3)
    .bind(question.source_year)
    .bind(&question.source_month)
    .bind(&question.source_grade)
    .bind(&question.source_org)
    .bind(question.source_number)
    .bind(question.question_number)
    .bind(&question.question_text)
    .bind(&question.passage)
    .bind(&question.choices[0])
    .bind(&question.choices[1])
    .bind(&question.choices[2])
    .bind(&question.choices[3])
    .bind(&question.choices[4])
    .bind(&question.correct_answer)
    .bind(&question.model_translation)
    .bind(&question.image_path)
    .bind(&question.pdf_filename)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(())
}

pub(crate) async fn count_by_filename(pool: &PgPool, pdf_filename: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(DISTINCT question_number) FROM mock_exam_questions WHERE pdf_filename = $1",
    )
    .bind(pdf_filename)
    .fetch_one(pool)
    .await
}

pub(crate) async fn numbers_by_filename(
    executor: impl sqlx::PgExecutor<'_>,
    pdf_filename: &str,
) -> Result<Vec<i32>, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(
        "SELECT DISTINCT question_number
         FROM mock_exam_questions
         WHERE pdf_filename = $1
         ORDER BY question_number",
    )
    .bind(pdf_filename)
    .fetch_all(executor)
    .await
}

pub(crate) async fn delete_by_filename(
    executor: impl sqlx::PgExecutor<'_>,
    pdf_filename: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM mock_exam_questions WHERE pdf_filename = $1")
        .bind(pdf_filename)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn total_count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM mock_exam_questions").fetch_one(pool).await
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &QuestionFilter) {
    let exact = [
        ("type1", &filter.type1),
        ("type2", &filter.type2),
        ("type3", &filter.type3),
        ("source_grade", &filter.source_grade),
        ("source_org", &filter.source_org),
        ("pdf_filename", &filter.pdf_filename),
    ];

    for (column, value) in exact {
        if let Some(value) = value {
            builder.push(format!(" AND {column} = "));
            builder.push_bind(value.clone());
        }
    }

    if let Some(year) = filter.source_year {
        builder.push(" AND source_year = ");
        builder.push_bind(year);
    }

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|value| !value.is_empty())
    {
        let pattern = format!("%{search}%");
        builder.push(" AND (question_text ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR passage ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

/// Filtered listing ordered by file then item number; `page` is `(skip, limit)`.
pub(crate) async fn list(
    pool: &PgPool,
    filter: &QuestionFilter,
    page: Option<(i64, i64)>,
) -> Result<Vec<MockExamQuestion>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {COLUMNS} FROM mock_exam_questions WHERE 1=1"
    ));
    push_filters(&mut builder, filter);
    builder.push(" ORDER BY pdf_filename, question_number");

    if let Some((skip, limit)) = page {
        builder.push(" OFFSET ");
        builder.push_bind(skip.max(0));
        builder.push(" LIMIT ");
        builder.push_bind(limit.clamp(1, 1000));
    }

    builder.build_query_as::<MockExamQuestion>().fetch_all(pool).await
}

pub(crate) async fn count(pool: &PgPool, filter: &QuestionFilter) -> Result<i64, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM mock_exam_questions WHERE 1=1");
    push_filters(&mut builder, filter);
    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

async fn distinct_text(pool: &PgPool, column: &str) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(&format!(
        "SELECT DISTINCT {column}
         FROM mock_exam_questions
         WHERE {column} IS NOT NULL AND {column} <> ''
         ORDER BY {column}"
    ))
    .fetch_all(pool)
    .await
}

pub(crate) async fn filter_options(pool: &PgPool) -> Result<FilterOptions, sqlx::Error> {
    let source_year = sqlx::query_scalar::<_, i32>(
        "SELECT DISTINCT source_year
         FROM mock_exam_questions
         WHERE source_year IS NOT NULL
         ORDER BY source_year DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(FilterOptions {
        type1: distinct_text(pool, "type1").await?,
        type2: distinct_text(pool, "type2").await?,
        type3: distinct_text(pool, "type3").await?,
        source_grade: distinct_text(pool, "source_grade").await?,
        source_year,
        source_org: distinct_text(pool, "source_org").await?,
        pdf_filename: distinct_text(pool, "pdf_filename").await?,
    })
}

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<MockExamQuestion>, sqlx::Error> {
    sqlx::query_as::<_, MockExamQuestion>(&format!(
        "SELECT {COLUMNS} FROM mock_exam_questions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn update_content(
    pool: &PgPool,
    id: &str,
    params: UpdateQuestion<'_>,
) -> Result<Option<MockExamQuestion>, sqlx::Error> {
    sqlx::query_as::<_, MockExamQuestion>(&format!(
        "UPDATE mock_exam_questions
         SET question_text = COALESCE($1, question_text),
             passage = COALESCE($2, passage),
             choice_1 = COALESCE($3, choice_1),
             choice_2 = COALESCE($4, choice_2),
             choice_3 = COALESCE($5, choice_3),
             choice_4 = COALESCE($6, choice_4),
             choice_5 = COALESCE($7, choice_5),
             correct_answer = COALESCE($8, correct_answer),
             model_translation = COALESCE($9, model_translation)
         WHERE id = $10
         RETURNING {COLUMNS}"
    ))
    .bind(params.question_text)
    .bind(params.passage)
    .bind(params.choices[0])
    .bind(params.choices[1])
    .bind(params.choices[2])
    .bind(params.choices[3])
    .bind(params.choices[4])
    .bind(params.correct_answer)
    .bind(params.model_translation)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn set_image_path(
    pool: &PgPool,
    id: &str,
    image_path: &str,
) -> Result<Option<MockExamQuestion>, sqlx::Error> {
    sqlx::query_as::<_, MockExamQuestion>(&format!(
        "UPDATE mock_exam_questions SET image_path = $1 WHERE id = $2 RETURNING {COLUMNS}"
    ))
    .bind(image_path)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM mock_exam_questions WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::primitive_now_utc;
    use crate::test_support;

    #[tokio::test]
    async fn saved_count_ignores_repeated_numbers() {
        let Some((_guard, pool)) = test_support::test_pool().await else {
            return;
        };
        let question = NewQuestion {
            question_number: 7,
            question_text: "어법상 틀린 것은?".to_string(),
            pdf_filename: "a.pdf".to_string(),
            ..NewQuestion::default()
        };
        let now = primitive_now_utc();
        insert(&pool, "q-1", &question, now).await.expect("insert");
        insert(&pool, "q-2", &question, now).await.expect("insert");

        assert_eq!(count_by_filename(&pool, "a.pdf").await.expect("count"), 1);
        assert_eq!(numbers_by_filename(&pool, "a.pdf").await.expect("numbers"), vec![7]);
    }
}
