//! The Content Catalog: courses and lessons, tagged by CEFR level and skill.

use std::collections::BTreeSet;
use std::time::Duration;

use assess_domain::{CefrLevel, Course, Lesson};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::item_bank_repository::cefr_to_str;
use crate::StorageError;

const CATALOG_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, sqlx::FromRow)]
struct CourseRow {
    id: Uuid,
    pathway_id: Uuid,
    target_cefr: String,
    primary_skill: String,
    secondary_skills: Json<BTreeSet<String>>,
    prerequisites: Json<BTreeSet<Uuid>>,
    difficulty_order: i32,
    active: bool,
}

fn parse_cefr(s: &str) -> Result<CefrLevel, StorageError> {
    assess_domain::CefrLevel::ALL
        .iter()
        .copied()
        .find(|l| cefr_to_str(*l) == s)
        .ok_or_else(|| StorageError::Query(sqlx::Error::Decode(format!("invalid cefr: {s}").into())))
}

impl TryFrom<CourseRow> for Course {
    type Error = StorageError;

    fn try_from(row: CourseRow) -> Result<Self, Self::Error> {
        Ok(Course {
            id: row.id,
            pathway_id: row.pathway_id,
            target_cefr: parse_cefr(&row.target_cefr)?,
            primary_skill: row.primary_skill,
            secondary_skills: row.secondary_skills.0,
            prerequisites: row.prerequisites.0,
            difficulty_order: row.difficulty_order as u32,
            active: row.active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LessonRow {
    id: Uuid,
    course_id: Uuid,
    target_skills: Json<BTreeSet<String>>,
    order_num: i32,
    active: bool,
}

impl From<LessonRow> for Lesson {
    fn from(row: LessonRow) -> Self {
        Lesson {
            id: row.id,
            course_id: row.course_id,
            target_skills: row.target_skills.0,
            order: row.order_num as u32,
            active: row.active,
        }
    }
}

#[derive(Clone)]
pub struct ContentCatalogRepository {
    pool: PgPool,
    courses_by_pathway: TtlCache<Uuid, Vec<Course>>,
    lessons_by_course: TtlCache<Uuid, Vec<Lesson>>,
}

impl ContentCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            courses_by_pathway: TtlCache::new(CATALOG_TTL),
            lessons_by_course: TtlCache::new(CATALOG_TTL),
        }
    }

    /// Active courses in a pathway, targeting `cefr` or one band above it.
    ///
    /// The full active course list for a pathway is cached for [`CATALOG_TTL`];
    /// the band filter is applied in-memory so one cache entry serves every
    /// gap size a recommendation pass asks for.
    pub async fn candidate_courses(
        &self,
        pathway_id: Uuid,
        bands: &[&str],
    ) -> Result<Vec<Course>, StorageError> {
        let courses = match self.courses_by_pathway.get(&pathway_id) {
            Some(courses) => courses,
            None => {
                let rows = sqlx::query_as::<_, CourseRow>(
                    "SELECT * FROM courses WHERE pathway_id = $1 AND active = TRUE ORDER BY difficulty_order ASC",
                )
                .bind(pathway_id)
                .fetch_all(&self.pool)
                .await?;
                let courses: Vec<Course> = rows.into_iter().map(TryInto::try_into).collect::<Result<_, _>>()?;
                self.courses_by_pathway.insert(pathway_id, courses.clone());
                courses
            }
        };
        Ok(courses
            .into_iter()
            .filter(|c| bands.contains(&cefr_to_str(c.target_cefr)))
            .collect())
    }

    pub async fn lessons_for_course(
        &self,
        course_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Lesson>, StorageError> {
        let lessons = match self.lessons_by_course.get(&course_id) {
            Some(lessons) => lessons,
            None => {
                let rows = sqlx::query_as::<_, LessonRow>(
                    "SELECT * FROM lessons WHERE course_id = $1 AND active = TRUE ORDER BY order_num ASC",
                )
                .bind(course_id)
                .fetch_all(&self.pool)
                .await?;
                let lessons: Vec<Lesson> = rows.into_iter().map(Into::into).collect();
                self.lessons_by_course.insert(course_id, lessons.clone());
                lessons
            }
        };
        Ok(lessons.into_iter().take(limit.max(0) as usize).collect())
    }

    pub async fn content_exists(&self, id: Uuid, content_type: assess_domain::ContentType) -> Result<bool, StorageError> {
        let table = match content_type {
            assess_domain::ContentType::Course => "courses",
            assess_domain::ContentType::Lesson => "lessons",
        };
        let query = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = $1 AND active = TRUE)");
        let exists: bool = sqlx::query_scalar(&query).bind(id).fetch_one(&self.pool).await?;
        Ok(exists)
    }

    pub async fn create_course(&self, course: &Course) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO courses (id, pathway_id, target_cefr, primary_skill, secondary_skills, prerequisites, difficulty_order, active)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(course.id)
        .bind(course.pathway_id)
        .bind(cefr_to_str(course.target_cefr))
        .bind(&course.primary_skill)
        .bind(Json(&course.secondary_skills))
        .bind(Json(&course.prerequisites))
        .bind(course.difficulty_order as i32)
        .bind(course.active)
        .execute(&self.pool)
        .await?;
        self.courses_by_pathway.clear();
        Ok(())
    }

    pub async fn create_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO lessons (id, course_id, target_skills, order_num, active) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(lesson.id)
        .bind(lesson.course_id)
        .bind(Json(&lesson.target_skills))
        .bind(lesson.order as i32)
        .bind(lesson.active)
        .execute(&self.pool)
        .await?;
        self.lessons_by_course.clear();
        Ok(())
    }
}
