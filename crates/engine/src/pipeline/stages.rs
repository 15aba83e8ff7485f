/// What a stage's final answer must look like.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputContract {
    /// Free-form notes handed to later stages as context.
    FreeText,
    /// A single JSON document matching the report schema.
    ReportJson,
}

/// One step of the analysis pipeline: the persona running it and its task template.
///
/// Task templates may reference `{query}`, `{urls}`, `{hashtags}` and `{keywords}`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StageDescriptor {
    /// Stable identifier, also the prompt override filename stem.
    pub key: &'static str,
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
    pub system_message: &'static str,
    pub instructions: &'static str,
    pub expected_output: &'static str,
    pub uses_tools: bool,
    pub output: OutputContract,
}

impl StageDescriptor {
    /// System prompt composed from the persona fields.
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!(
            "You are the {}.\n\nGoal: {}\n\nBackground: {}\n\n{}",
            self.role, self.goal, self.backstory, self.system_message
        );
        if !self.uses_tools {
            prompt.push_str("\n\nYou have no tools. Work only from the context you are given.");
        }
        if self.output == OutputContract::ReportJson {
            prompt.push_str(
                "\n\nRespond with one JSON object and nothing else: no prose, no code fences.",
            );
        }
        prompt
    }
}

const WEB_CRAWLER_TASK: &str = "\
Search and collect news articles about: {query}

Instructions:
1. Use the search tools to find 5-7 recent news articles about the topic
2. Extract basic information: title, URL, source domain, publication date
3. Assess source reliability (High/Medium/Low)
4. Note any obvious bias or credibility issues
5. Provide a short summary of what you found

Starting points supplied by the user: {urls}

Output format:
- Article 1: [Title] from [Source] - [URL] - Reliability: [High/Medium/Low]
- Article 2: [Title] from [Source] - [URL] - Reliability: [High/Medium/Low]
- Summary: brief overview of the articles found

Keep it simple and factual.";

const CONTENT_ANALYST_TASK: &str = "\
Analyze the content of the news articles found for: {query}

Instructions:
1. Review the articles found by the Web Crawler
2. Extract the main themes and key points
3. Identify 10-15 important keywords related to the topic (user keywords: {keywords})
4. Note any conflicting information between sources
5. Assess the overall factual quality

Output format:
Key Findings: [main points from the articles]
Important Keywords: [list of relevant words]
Conflicting Information: [any contradictions found]
Factual Assessment: [overall quality assessment]

Be clear and concise.";

const SOCIAL_MEDIA_TASK: &str = "\
Research social media activity around: {query}

Instructions:
1. Search for mentions of this topic on social platforms
2. Find 3-5 relevant hashtags being used (user hashtags: {hashtags})
3. Assess general engagement levels (High/Medium/Low)
4. Note the overall sentiment (Positive/Negative/Neutral/Mixed)
5. Look for any viral or trending patterns

Output format:
Top Hashtags: #hashtag1, #hashtag2, #hashtag3
Engagement Level: [High/Medium/Low]
Overall Sentiment: [Positive/Negative/Neutral/Mixed]
Trending Patterns: [any notable patterns]

Keep observations factual and simple.";

const DATA_ORGANIZER_TASK: &str = "\
Organize the collected data for easy understanding of: {query}

Instructions:
1. Group the findings into main topic categories
2. Create a simple timeline if dates are available
3. Organize sources by reliability level
4. Prepare a summary of the data patterns found

Output format:
Topic Categories: [main themes grouped]
Timeline: [key dates and events if available]
Source Reliability: High: [list], Medium: [list], Low: [list]
Data Patterns: [summary of what the data shows]

Focus on clear organization.";

const RELIABILITY_TASK: &str = "\
Examine the content for propaganda techniques and misinformation about: {query}

Instructions:
1. Look for obvious propaganda techniques (emotional appeals, loaded language, etc.)
2. Check for clear factual errors or misleading claims
3. Note any suspicious coordination between sources
4. Assess overall credibility on a scale of 1-10
5. Suggest basic verification steps

Output format:
Propaganda Techniques Found: [list any obvious techniques]
Factual Issues: [any clear errors or misleading claims]
Source Coordination: [any suspicious patterns]
Credibility Score: [1-10 with brief explanation]
Verification Steps: [how readers can verify the information]

Only flag obvious issues.";

const REPORT_COMPILER_TASK: &str = "\
Create a comprehensive report combining all analysis of: {query}

Instructions:
1. Compile all findings from the previous tasks
2. Put the most important findings first
3. Add practical verification recommendations for readers
4. Keep the language clear and accessible

Context:
- Query: {query}
- URLs: {urls}
- Keywords: {keywords}
- Hashtags: {hashtags}

Populate every field with actual analysis data, not placeholder text.";

/// The six stages, in execution order.
pub fn roster() -> Vec<StageDescriptor> {
    vec![
        StageDescriptor {
            key: "web_crawler",
            role: "Web Crawler",
            goal: "Quickly find 3-5 recent news articles about the query using search tools",
            backstory: "An efficient web crawler that finds the most relevant recent \
                        articles quickly without deep scraping.",
            system_message: "Focus only on finding article titles, URLs and sources. \
                             Do not analyze content deeply. Limit yourself to 3-5 articles.",
            instructions: WEB_CRAWLER_TASK,
            expected_output: "List of 5-7 news articles with titles, sources, URLs and a basic \
                              reliability assessment, plus a brief summary.",
            uses_tools: true,
            output: OutputContract::FreeText,
        },
        StageDescriptor {
            key: "content_analyst",
            role: "News Content Analyst",
            goal: "Quickly analyze the main themes from article titles and summaries",
            backstory: "A fast content analyst who works from headlines and brief summaries \
                        to extract key themes.",
            system_message: "Analyze headlines and brief summaries. Do not scrape full article \
                             content. Identify 5-7 key themes quickly.",
            instructions: CONTENT_ANALYST_TASK,
            expected_output: "Content analysis with key findings, important keywords, \
                              conflicting information and a factual assessment.",
            uses_tools: true,
            output: OutputContract::FreeText,
        },
        StageDescriptor {
            key: "social_media_tracker",
            role: "Social Media Tracking Specialist",
            goal: "Quickly identify trending hashtags and basic sentiment using search",
            backstory: "A social media expert who uses search tools to spot popular hashtags \
                        and general sentiment.",
            system_message: "Find 3-5 popular hashtags and the general sentiment. \
                             Do not perform deep social media analysis.",
            instructions: SOCIAL_MEDIA_TASK,
            expected_output: "Social media analysis with top hashtags, engagement levels, \
                              sentiment and trending patterns.",
            uses_tools: true,
            output: OutputContract::FreeText,
        },
        StageDescriptor {
            key: "data_organizer",
            role: "Data Organizer",
            goal: "Organize the collected information into a structured format",
            backstory: "A data organization specialist who structures information \
                        without additional research.",
            system_message: "Only organize and structure the data provided by earlier stages. \
                             Do not conduct additional research.",
            instructions: DATA_ORGANIZER_TASK,
            expected_output: "Organized data with topic categories, timeline, source \
                              reliability groupings and a pattern summary.",
            uses_tools: false,
            output: OutputContract::FreeText,
        },
        StageDescriptor {
            key: "reliability_assessor",
            role: "Basic Reliability Assessor",
            goal: "Provide a basic reliability assessment of sources without deep investigation",
            backstory: "A reliability assessor who gives quick credibility checks based on \
                        well-known source reputations.",
            system_message: "Give basic reliability scores based on common knowledge of source \
                             credibility. Do not conduct deep verification research.",
            instructions: RELIABILITY_TASK,
            expected_output: "Analysis of propaganda techniques, factual issues, coordination \
                              patterns, a credibility score and verification recommendations.",
            uses_tools: true,
            output: OutputContract::FreeText,
        },
        StageDescriptor {
            key: "report_compiler",
            role: "Report Compiler",
            goal: "Compile all findings into the required JSON report format",
            backstory: "A report writer who compiles analysis into structured JSON \
                        without additional research.",
            system_message: "Compile the provided information into the required JSON schema. \
                             Do not conduct additional research or analysis.",
            instructions: REPORT_COMPILER_TASK,
            expected_output: "A comprehensive news analysis report as one JSON object that \
                              follows the schema exactly.",
            uses_tools: false,
            output: OutputContract::ReportJson,
        },
    ]
}

/// Keys of every stage, in order.
pub fn stage_keys() -> Vec<&'static str> {
    roster().iter().map(|s| s.key).collect()
}
