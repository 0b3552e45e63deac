// Prompt templates for the opposing-viewpoint persona.

use crate::session::Session;

pub fn opening_prompt(topic: &str, viewpoint: &str, reference: Option<&str>) -> String {
    let intro = format!(
        "You are a thoughtful conversation partner helping explore different perspectives. \
         The user wants to discuss the following topic: \"{}\".\n\n\
         The user's viewpoint is: \"{}\".",
        topic, viewpoint
    );

    match reference {
        Some(reference) => format!(
            "{}\n\nReference information from a web page:\n{}\n\n\
             Your role is to take the OPPOSITE viewpoint from the user and present a respectful, \
             well-reasoned opening perspective. Use the reference information to inform your \
             understanding of the topic, but maintain your opposing stance. Be kind, acknowledge \
             that the user's perspective has merit, but clearly present the opposing position. \
             Keep your response conversational and engaging, around 3-4 sentences.\n\n\
             Generate only your opening statement, nothing else.",
            intro, reference
        ),
        None => format!(
            "{}\n\n\
             Your role is to take the OPPOSITE viewpoint from the user and present a respectful, \
             well-reasoned opening perspective. Be kind, acknowledge that the user's perspective \
             has merit, but clearly present the opposing position. Keep your response \
             conversational and engaging, around 3-4 sentences.\n\n\
             Generate only your opening statement, nothing else.",
            intro
        ),
    }
}

/// `session` is the conversation before `user_text` was added.
pub fn follow_up_prompt(session: &Session, user_text: &str) -> String {
    let reference_context = match (&session.reference_content, &session.reference_url) {
        (Some(content), url) => format!(
            "\n\nReference information from {}:\n{}\n\n",
            url.as_deref().unwrap_or("a web page"),
            content
        ),
        (None, _) => String::new(),
    };

    format!(
        "You are engaged in a respectful exploration of perspectives about \"{topic}\".\n\n\
         The user's position is: \"{viewpoint}\".\n\
         Your position is the OPPOSITE of the user's viewpoint.{reference}\n\
         Conversation so far:\n\
         {history}\n\n\
         User: {user_text}\n\n\
         Respond to the user's latest message by:\n\
         1. Acknowledging any valid points they made\n\
         2. Respectfully presenting counter-arguments from the opposing viewpoint\n\
         3. Being kind and constructive, never dismissive\n\
         4. Keeping your response conversational, around 3-5 sentences\n\n\
         Generate only your response, nothing else.",
        topic = session.topic,
        viewpoint = session.user_viewpoint,
        reference = reference_context,
        history = session.transcript(),
        user_text = user_text,
    )
}
