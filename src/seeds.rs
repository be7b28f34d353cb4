//! Built-in challenge bank. Guarantees the arena is playable without any config file.

use crate::domain::{Challenge, Difficulty, Domain, Modality};

pub const TIMEBOMB_IMAGE_URL: &str =
  "https://vgpumykbihcvuvzxwcue.supabase.co/storage/v1/object/public/Vibebench/VibeBench%20-%20Timebomb.png";

#[allow(clippy::too_many_arguments)]
fn challenge(
  id: &str,
  domain: Domain,
  title: &str,
  difficulty: Difficulty,
  modality: Modality,
  description: &str,
  tactical_constraint: &str,
  example: (&str, &str),
  judge_context: &str,
) -> Challenge {
  Challenge {
    id: id.into(),
    domain,
    title: title.into(),
    difficulty,
    modality,
    description: description.into(),
    tactical_constraint: tactical_constraint.into(),
    example_input: example.0.into(),
    example_output: example.1.into(),
    image_url: None,
    judge_context: judge_context.trim().into(),
    initiative_targets: vec![],
  }
}

/// Two verticals, three tiers each. Ordered Frontend then Backend, easy to hard.
pub fn seed_challenges() -> Vec<Challenge> {
  let mut timebomb = challenge(
    "frontend-hard",
    Domain::Frontend,
    "Timebomb Protocol",
    Difficulty::Hard,
    Modality::Image,
    "Replicate the 'System Alert' component shown in the visual intel. Design fidelity is critical.",
    "The component must match the reference exactly, including any implied behaviors derived from the visual state.",
    (
      r#"<SystemAlert message="Breach Imminent" level="critical" />"#,
      "// Renders glassmorphic alert with animated countdown bar (100% -> 0%)",
    ),
    r#"
CHALLENGE: Timebomb Protocol (Frontend Hard)
EVALUATION CONTEXT:
Hard multimodal challenge. The user sees a STATIC image showing a progress bar at 50%. The core test: do they infer an ANIMATED countdown, or only describe the static state?
COMPLETENESS CHECKLIST:
- [ ] Glassmorphism effect (backdrop-blur, transparency)
- [ ] Animation exists, runs 100% -> 0%, duration specified
- [ ] Message prop and alert level variants
- [ ] Close button
- [ ] role="alert" or aria-live
CRITICAL TRAPS:
1. THE STATIC TRAP (FATAL): hardcoded "width: 50%". Completeness cap 30, Engineering Judgment cap 20.
2. THE PERFORMANCE TRAP: animating CSS width instead of transform: scaleX(). Engineering Judgment deduct 20.
3. THE ACCESSIBILITY TRAP: no role="alert"/aria-live. Completeness deduct 15.
4. THE SECURITY TRAP: dangerouslySetInnerHTML without sanitization. Engineering Judgment 0, verdict "XSS vulnerability. Prompt failed security review."
BONUSES:
- transform: scaleX for animation: +10 Engineering Judgment
- prefers-reduced-motion: +10 Engineering Judgment
- exact timing function: +5 Precision
- aria-live polite vs assertive: +5 Completeness
"#,
  );
  timebomb.image_url = Some(TIMEBOMB_IMAGE_URL.into());

  vec![
    challenge(
      "frontend-easy",
      Domain::Frontend,
      "Accessible Button",
      Difficulty::Easy,
      Modality::Text,
      "Build a reusable Button component that meets WCAG 2.1 AA accessibility standards.",
      "The component must be usable by keyboard-only users and screen reader users. No accessibility shortcuts.",
      (
        r#"<Button variant="primary" onClick={handleSubmit}>Submit Form</Button>"#,
        "// Renders accessible button with proper focus states, ARIA attributes, and keyboard handling",
      ),
      r#"
CHALLENGE: Accessible Button (Frontend Easy)
EVALUATION CONTEXT:
Tests fundamental accessibility knowledge. Most developers think "accessible" means adding aria-label; it is much more than that.
COMPLETENESS CHECKLIST:
- [ ] focus-visible states
- [ ] Disabled state (visual and functional)
- [ ] Enter and Space trigger onClick
- [ ] Loading state with aria-busy
- [ ] Variant props and type attribute
TRAPS:
1. FOCUS TRAP: "add focus styles" without focus-visible. Engineering Judgment deduct 10.
2. DISABLED TRAP: disabled attribute alone without aria-disabled. Engineering Judgment deduct 10.
3. KEYBOARD TRAP: no keyboard handling at all. Completeness caps at 60.
BONUSES:
- 44px minimum touch target: +5 Engineering Judgment
- Colour contrast requirements: +5 Completeness
- Reduced motion for animations: +5 Engineering Judgment
"#,
    ),
    challenge(
      "frontend-medium",
      Domain::Frontend,
      "State Management",
      Difficulty::Medium,
      Modality::Text,
      "Implement a data table component with optimistic UI updates. Users can edit cell values inline.",
      "Edits must appear instantly (optimistic update), sync to server in background, and rollback gracefully on failure. User trust is paramount.",
      (
        r#"User edits cell from "Draft" to "Published", server returns 500 error"#,
        r#"Cell reverts to "Draft", toast shows "Update failed", no data corruption"#,
      ),
      r#"
CHALLENGE: State Management (Frontend Medium)
EVALUATION CONTEXT:
Tests optimistic UI patterns, a common requirement many developers get subtly wrong.
COMPLETENESS CHECKLIST:
- [ ] Immediate optimistic update
- [ ] Background sync and error detection
- [ ] Rollback to previous state on failure
- [ ] User feedback and pending indicator
TRAPS:
1. RACE CONDITION TRAP: rapid A->B->C edits where B fails are not considered. Engineering Judgment deduct 15.
2. ROLLBACK STATE TRAP: rollback target (previous value, not original) unspecified. Precision deduct 10.
3. NO FEEDBACK TRAP: no sync status indication. Completeness caps at 70.
BONUSES:
- Debouncing rapid edits: +10 Engineering Judgment
- Retry before showing error: +5 Engineering Judgment
- Offline/network detection: +5 Completeness
"#,
    ),
    timebomb,
    challenge(
      "backend-easy",
      Domain::Backend,
      "SQL Minefield",
      Difficulty::Easy,
      Modality::Text,
      "Create a secure Node.js Express route /search that queries a users table based on a query parameter.",
      "The database contains VIP client data. Strict adherence to OWASP guidelines. Zero tolerance for injection vulnerabilities.",
      ("GET /search?q=alice", r#"Returns users matching "alice" using parameterized query"#),
      r#"
CHALLENGE: SQL Minefield (Backend Easy)
EVALUATION CONTEXT:
Tests fundamental security knowledge. SQL injection is well known, yet still gotten wrong in subtle ways.
COMPLETENESS CHECKLIST:
- [ ] Parameterized query
- [ ] Input validation and empty query handling
- [ ] Errors do not leak DB details
- [ ] Response format specified
CRITICAL TRAPS:
1. THE INJECTION TRAP (FATAL): string concatenation into SQL. All CEPE scores cap at 10, verdict "SQL injection vulnerable. System compromised."
2. THE SELECT * TRAP: columns unspecified. Engineering Judgment deduct 15.
3. THE EMPTY QUERY TRAP: empty q dumps the table. Completeness deduct 20.
4. THE ERROR LEAK TRAP: raw DB errors returned. Engineering Judgment deduct 10.
BONUSES:
- Rate limiting: +10 Engineering Judgment
- Audit logging: +5 Engineering Judgment
- LIKE with proper escaping: +5 Precision
- HTTP status codes for errors: +5 Completeness
"#,
    ),
    challenge(
      "backend-medium",
      Domain::Backend,
      "Rate Limiter",
      Difficulty::Medium,
      Modality::Voice,
      "Design an API rate limiter that restricts users to 100 requests per minute. Explain your approach out loud.",
      "The system serves a global user base. Your solution must be clear, complete, and articulated verbally. No written prompts: speak your design.",
      ("User makes 101st request within 60 seconds", "Returns 429 Too Many Requests with Retry-After header"),
      r#"
CHALLENGE: Rate Limiter (Backend Medium), VOICE MODALITY
EVALUATION CONTEXT:
The user verbally articulates a rate limiter design. Filler words are expected; excessive filler impacts Efficiency. Could a junior dev implement from this description?
COMPLETENESS CHECKLIST:
- [ ] Algorithm choice explained
- [ ] Storage mechanism and key design
- [ ] 100 req/min limit, 429 response, Retry-After and X-RateLimit-* headers
- [ ] Time window handling
TRAPS:
1. THE FIXED WINDOW TRAP: fixed window without acknowledging boundary bursts. Engineering Judgment deduct 10; sliding window or token bucket with reasons: +10.
2. THE SINGLE SERVER TRAP: no distributed storage. Engineering Judgment deduct 15.
3. THE RACE CONDITION TRAP: non-atomic check-then-increment. Engineering Judgment deduct 10.
4. THE NO HEADERS TRAP: missing Retry-After. Completeness deduct 10.
BONUSES:
- Algorithm tradeoffs explained: +10 Engineering Judgment
- Lua script for atomicity: +5 Engineering Judgment
- Per-endpoint limits: +5 Completeness
- Well-organized verbal delivery: +5 Efficiency
"#,
    ),
    challenge(
      "backend-hard",
      Domain::Backend,
      "Thundering Herd",
      Difficulty::Hard,
      Modality::Text,
      "Implement a Node.js function incrementViewCount(postId) using Redis. It must maintain 100% accuracy under high concurrency.",
      "The system handles 10,000 requests per second. Zero tolerance for race conditions. Every view must be counted exactly once.",
      (r#"10,000 concurrent calls to incrementViewCount("post_123")"#, r#"Redis key "views:post_123" equals exactly 10000"#),
      r#"
CHALLENGE: Thundering Herd (Backend Hard)
EVALUATION CONTEXT:
Tests atomic operations under high concurrency. Do they understand that read-modify-write is NOT safe?
COMPLETENESS CHECKLIST:
- [ ] Atomic INCR, not GET then SET
- [ ] Connection pooling and reuse
- [ ] Error handling for Redis failures
- [ ] Return value, key naming, postId validation
CRITICAL TRAPS:
1. THE RACE CONDITION TRAP (FATAL): get then set. All CEPE scores cap at 15, verdict "Race condition detected. At 10k req/s, you're losing thousands of views."
2. THE CONNECTION TRAP: new connection per request. Engineering Judgment deduct 20.
3. THE NO ERROR HANDLING TRAP: Redis failure unhandled. Completeness deduct 15, Engineering Judgment deduct 10.
4. THE FLOATING POINT TRAP: non-integer increment. Precision deduct 10.
BONUSES:
- Pipelining: +10 Engineering Judgment
- Lua script: +5 Engineering Judgment
- Circuit breaker: +10 Engineering Judgment
- Failure metrics: +5 Completeness
"#,
    ),
  ]
}
