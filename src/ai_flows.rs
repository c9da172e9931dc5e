use anyhow::{Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{error, info, warn};

use crate::ai_client::{AiClient, GenerationRequest, parse_generated};
use crate::models::QuizQuestion;

pub const DEFAULT_QUIZ_QUESTIONS: u32 = 5;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://\S+$").expect("valid url pattern"));

/// Short content fingerprint used to group flashcard decks and quiz results
/// under the summary they were generated from.
pub fn summary_fingerprint(summary: &str) -> String {
    format!("{:x}", md5::compute(summary.as_bytes()))[..12].to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryOutput {
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardContent {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedFlashcards {
    pub flashcards: Vec<FlashcardContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuiz {
    pub quiz_title: String,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub explanation_points: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRelevance {
    pub prelims: Vec<String>,
    pub mains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebatePoints {
    pub topic: String,
    pub arguments_for: Vec<String>,
    pub arguments_against: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IasBriefing {
    pub ias_summary: String,
    pub exam_relevance: ExamRelevance,
    pub key_insights: Vec<String>,
    pub debate_points: DebatePoints,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Formula {
    pub name: String,
    pub formula: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AptitudeHelp {
    pub identified_topic: String,
    #[serde(default)]
    pub relevant_formulas: Vec<Formula>,
    #[serde(default)]
    pub explanation_steps: Option<Vec<String>>,
    #[serde(default)]
    pub key_concepts: Option<Vec<String>>,
}

/// The content-generation flows. Each is one request/response pair with a
/// fixed output schema; a response that fails schema validation abandons the
/// operation with no partial state committed.
#[derive(Clone)]
pub struct AiFlows {
    client: AiClient,
}

impl AiFlows {
    pub fn new(client: AiClient) -> Self {
        AiFlows { client }
    }

    pub async fn summarize(&self, material: &str) -> Result<SummaryOutput> {
        let source = if URL_PATTERN.is_match(material.trim()) {
            "the study material found at this URL"
        } else {
            "the following study material"
        };

        let prompt = format!(
            r#"Please provide a concise and informative summary of {source}:

{material}

Respond with a JSON object in this exact format:
{{"summary": "The summary text"}}"#,
        );

        let request = GenerationRequest::new(
            "You are an expert summarizer for study material. Always respond with valid JSON in the requested format.",
            prompt,
        );
        let response = self.client.generate(&request).await?;
        let output: SummaryOutput = self.parse("summarize", &response)?;

        info!(
            flow = "summarize",
            summary_length = output.summary.len(),
            "Generated summary"
        );
        Ok(output)
    }

    pub async fn generate_flashcards(&self, summary: &str) -> Result<GeneratedFlashcards> {
        let prompt = format!(
            r#"Based on the following summary, create a set of 8-12 flashcards covering its key facts and concepts.

Summary:
{summary}

Respond with a JSON object in this exact format:
{{
    "flashcards": [
        {{"question": "Question text", "answer": "Answer text"}}
    ]
}}

Guidelines:
- Each question should test a single fact or concept.
- Keep answers short enough to recall from memory.
- Cover the whole summary rather than repeating one theme."#,
        );

        let request = GenerationRequest::new(
            "You are an expert educator creating study flashcards. Always respond with valid JSON in the requested format.",
            prompt,
        )
        .with_temperature(0.7);
        let response = self.client.generate(&request).await?;
        let output: GeneratedFlashcards = self.parse("generate_flashcards", &response)?;

        if output.flashcards.is_empty() {
            return Err(anyhow!("generated flashcard set is empty"));
        }
        info!(
            flow = "generate_flashcards",
            card_count = output.flashcards.len(),
            "Generated flashcards"
        );
        Ok(output)
    }

    pub async fn generate_quiz(
        &self,
        summary: &str,
        num_questions: Option<u32>,
    ) -> Result<GeneratedQuiz> {
        let wanted = num_questions.unwrap_or(DEFAULT_QUIZ_QUESTIONS);

        let prompt = format!(
            r#"Create a multiple-choice quiz to test understanding of the provided summary.

Summary:
{summary}

Requirements:
1. Create exactly {wanted} multiple-choice questions.
2. Each question has 4 distinct options.
3. "correctAnswer" must be the text of the correct option, copied from the options array.
4. Give the quiz a short, relevant title (e.g. "Key Concepts of [Topic]").

Respond with a JSON object in this exact format:
{{
    "quizTitle": "The quiz title",
    "questions": [
        {{
            "question": "Question text",
            "options": ["Option 1", "Option 2", "Option 3", "Option 4"],
            "correctAnswer": "Option 2"
        }}
    ]
}}"#,
        );

        let request = GenerationRequest::new(
            "You are an expert educator creating a multiple-choice quiz. Always respond with valid JSON in the requested format.",
            prompt,
        )
        .with_temperature(0.8);
        let response = self.client.generate(&request).await?;
        let output: GeneratedQuiz = self.parse("generate_quiz", &response)?;

        if output.questions.is_empty() {
            return Err(anyhow!("generated quiz has no questions"));
        }
        if output.questions.len() != wanted as usize {
            warn!(
                flow = "generate_quiz",
                requested = wanted,
                generated = output.questions.len(),
                "Quiz question count differs from request"
            );
        }
        info!(
            flow = "generate_quiz",
            quiz_title = %output.quiz_title,
            question_count = output.questions.len(),
            "Generated quiz"
        );
        Ok(output)
    }

    pub async fn generate_explanation(&self, summary: &str) -> Result<Explanation> {
        let prompt = format!(
            r#"Read the following summary and explain its main points in a list of simple bullet points.
Each bullet point should be a short, easy-to-understand sentence. Imagine you are talking directly to a curious 10-year-old. Avoid jargon and complex vocabulary.

Summary:
{summary}

Respond with a JSON object in this exact format:
{{"explanationPoints": ["First point", "Second point"]}}"#,
        );

        let request = GenerationRequest::new(
            "You are a friendly and patient teacher who is an expert at explaining complex ideas to children. Always respond with valid JSON in the requested format.",
            prompt,
        )
        .with_temperature(0.7);
        let response = self.client.generate(&request).await?;
        let output: Explanation = self.parse("generate_explanation", &response)?;

        if output.explanation_points.is_empty() {
            return Err(anyhow!("generated explanation has no points"));
        }
        info!(
            flow = "generate_explanation",
            point_count = output.explanation_points.len(),
            "Generated explanation"
        );
        Ok(output)
    }

    pub async fn process_ias_material(&self, material: &str) -> Result<IasBriefing> {
        let prompt = format!(
            r#"Analyze the following study material provided by a UPSC IAS aspirant.

Material:
{material}

Process the material comprehensively for exam preparation and respond with a JSON object in this exact format:
{{
    "iasSummary": "A concise summary (3-4 paragraphs) of the core concepts and facts relevant for the exam",
    "examRelevance": {{
        "prelims": ["3-5 bullet points on relevance for the Preliminary Exam"],
        "mains": ["3-5 bullet points on relevance for the Main Exam, naming the GS papers (GS-I to GS-IV, Essay) where the topic could be asked"]
    }},
    "keyInsights": ["5-7 bullet points with the most crucial insights, analysis points, or data to remember"],
    "debatePoints": {{
        "topic": "The core debatable issue stated in one sentence",
        "argumentsFor": ["3-4 distinct arguments for one side"],
        "argumentsAgainst": ["3-4 distinct arguments for the opposing side"]
    }}
}}

Ensure the language is analytical, objective, and suitable for an IAS aspirant, and that both sides of the debate are represented with valid perspectives."#,
        );

        let request = GenerationRequest::new(
            "You are an expert UPSC IAS exam mentor. Always respond with valid JSON in the requested format.",
            prompt,
        )
        .with_temperature(0.6);
        let response = self.client.generate(&request).await?;
        let output: IasBriefing = self.parse("process_ias_material", &response)?;

        info!(
            flow = "process_ias_material",
            insight_count = output.key_insights.len(),
            debate_topic = %output.debate_points.topic,
            "Processed IAS material"
        );
        Ok(output)
    }

    pub async fn generate_aptitude_help(&self, question_or_topic: &str) -> Result<AptitudeHelp> {
        let prompt = format!(
            r#"A user has submitted the following aptitude question or topic:

"{question_or_topic}"

Analyze the input and provide help:
1. Identify the core mathematical or logical topic (e.g. Percentages, Time and Work, Geometry).
2. List the key formulas for that topic, each with its common name, the formula itself, and optionally a short description of its variables.
3. If the input is a specific question, give a step-by-step explanation of how to solve it.
4. Optionally list 1-3 key underlying concepts.

Respond with a JSON object in this exact format:
{{
    "identifiedTopic": "The topic name",
    "relevantFormulas": [
        {{"name": "Simple Interest", "formula": "SI = P * R * T / 100", "description": "P principal, R rate, T time"}}
    ],
    "explanationSteps": ["Step 1", "Step 2"],
    "keyConcepts": ["Concept 1"]
}}

Prioritize providing the correct and most relevant formulas for the identified topic."#,
        );

        let request = GenerationRequest::new(
            "You are an expert aptitude tutor specializing in quantitative and logical reasoning problems. Always respond with valid JSON in the requested format.",
            prompt,
        )
        .with_temperature(0.5);
        let response = self.client.generate(&request).await?;
        let output: AptitudeHelp = self.parse("generate_aptitude_help", &response)?;

        info!(
            flow = "generate_aptitude_help",
            topic = %output.identified_topic,
            formula_count = output.relevant_formulas.len(),
            "Generated aptitude help"
        );
        Ok(output)
    }

    fn parse<T: serde::de::DeserializeOwned>(&self, flow: &str, response: &str) -> Result<T> {
        parse_generated(response).map_err(|e| {
            error!(flow = flow, error = %e, "Failed to validate generated content");
            e
        })
    }
}
