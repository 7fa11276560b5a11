mod common;

use std::sync::Arc;

use common::*;
use medilens_flow::{DiagnosticReport, ExecutionStatus, GraphError, PipelineState, Stage};

#[tokio::test]
async fn xray_produces_full_report_from_model_outputs() {
    let text = Arc::new(ScriptedText::default());
    let runner = runner(
        Arc::new(ScriptedVision::ok()),
        text.clone(),
        Some(Arc::new(FixedRetriever(vec![pneumonia_snippet()]))),
    );

    let session = runner
        .run(image("xray_001.png", 256, 256), QUERY, true)
        .await
        .unwrap();

    assert_eq!(session.state(), &PipelineState::ReportReady);
    assert_eq!(session.completed_stages(), Stage::ALL.to_vec());

    let findings = session.visual_findings().unwrap();
    assert_eq!(findings.structured.modality, "x-ray");
    assert_eq!(findings.structured.key_findings.len(), 2);

    let report = session.report().unwrap();
    assert_eq!(report.query, QUERY);
    assert!(report
        .section(DiagnosticReport::IMAGING_FINDINGS)
        .unwrap()
        .body
        .contains("Right lower lobe consolidation"));
    assert!(report
        .section(DiagnosticReport::CLINICAL_CONTEXT)
        .unwrap()
        .body
        .contains("builtin/pneumonia"));
    assert!(report
        .section(DiagnosticReport::DIAGNOSTIC_IMPRESSION)
        .unwrap()
        .body
        .contains("Right lower lobe pneumonia"));
    assert!(report
        .section(DiagnosticReport::RISKS)
        .unwrap()
        .body
        .contains("underlying mass"));
    assert!(report
        .section(DiagnosticReport::RECOMMENDATIONS)
        .unwrap()
        .body
        .contains("Follow-up radiograph"));

    // Reasoning saw the findings and the context; critique saw the hypothesis.
    let prompts = text.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("Right lower lobe consolidation"));
    assert!(prompts[0].contains("[builtin/pneumonia]"));
    assert!(prompts[1].contains("Right lower lobe pneumonia"));
}

#[tokio::test]
async fn empty_corpus_still_reaches_report_ready() {
    let runner = runner(
        Arc::new(ScriptedVision::ok()),
        Arc::new(ScriptedText::default()),
        Some(empty_corpus()),
    );

    let session = runner
        .run(image("xray_001.png", 256, 256), QUERY, true)
        .await
        .unwrap();

    assert_eq!(session.state(), &PipelineState::ReportReady);
    assert_eq!(session.retrieved_context(), Some(&[][..]));
    let report = session.report().unwrap();
    assert!(report.section(DiagnosticReport::CLINICAL_CONTEXT).is_none());
    assert!(report.section(DiagnosticReport::DIAGNOSTIC_IMPRESSION).is_some());
}

#[tokio::test]
async fn retrieval_is_skipped_when_context_not_requested() {
    let runner = runner(
        Arc::new(ScriptedVision::ok()),
        Arc::new(ScriptedText::default()),
        Some(Arc::new(FixedRetriever(vec![pneumonia_snippet()]))),
    );
    let mut session = runner
        .start_session(image("xray_001.png", 256, 256), QUERY, false)
        .unwrap();

    let result = runner.run_session(&mut session).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(
        result.stages,
        vec![
            Stage::ImageAnalysis,
            Stage::Reasoning,
            Stage::Critique,
            Stage::ReportWriting
        ]
    );
    assert!(session.retrieved_context().is_none());
}

#[tokio::test]
async fn retrieval_is_skipped_without_a_backend() {
    let runner = runner(
        Arc::new(ScriptedVision::ok()),
        Arc::new(ScriptedText::default()),
        None,
    );
    let mut session = runner
        .start_session(image("xray_001.png", 256, 256), QUERY, true)
        .unwrap();

    let result = runner.run_session(&mut session).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert!(!result.stages.contains(&Stage::Retrieval));
    assert_eq!(session.state(), &PipelineState::ReportReady);
    assert!(session.retrieved_context().is_none());
    let report = session.report().unwrap();
    assert!(report.section(DiagnosticReport::CLINICAL_CONTEXT).is_none());
    assert!(report.section(DiagnosticReport::DIAGNOSTIC_IMPRESSION).is_some());
}

#[tokio::test]
async fn vision_failure_stops_the_pipeline() {
    let text = Arc::new(ScriptedText::default());
    let runner = runner(
        Arc::new(ScriptedVision::failing()),
        text.clone(),
        Some(empty_corpus()),
    );
    let mut session = runner
        .start_session(image("xray_001.png", 256, 256), QUERY, true)
        .unwrap();

    let err = runner.run_session(&mut session).await.unwrap_err();

    assert!(matches!(
        err,
        GraphError::ExternalService {
            stage: Stage::ImageAnalysis,
            ..
        }
    ));
    assert!(matches!(
        session.state(),
        PipelineState::Failed {
            stage: Stage::ImageAnalysis,
            ..
        }
    ));
    assert!(session.visual_findings().is_none());
    assert!(session.retrieved_context().is_none());
    assert!(session.hypothesis().is_none());
    assert!(session.report().is_none());
    assert!(text.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_sessions_do_not_share_state() {
    let runner = runner(
        Arc::new(ScriptedVision::ok()),
        Arc::new(ScriptedText::default()),
        Some(Arc::new(FixedRetriever(vec![pneumonia_snippet()]))),
    );

    let (first, second) = tokio::join!(
        runner.run(image("xray_001.png", 200, 200), QUERY, true),
        runner.run(image("xray_002.png", 300, 300), "pleural effusion?", false),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    assert_ne!(first.id(), second.id());

    let first_report = first.report().unwrap();
    let second_report = second.report().unwrap();
    let impression = |report: &DiagnosticReport| {
        report
            .section(DiagnosticReport::DIAGNOSTIC_IMPRESSION)
            .unwrap()
            .body
            .clone()
    };

    assert!(impression(first_report).contains("IMG-200x200"));
    assert!(!impression(first_report).contains("IMG-300x300"));
    assert!(impression(second_report).contains("IMG-300x300"));
    assert!(!impression(second_report).contains("IMG-200x200"));

    assert_eq!(first_report.query, QUERY);
    assert_eq!(second_report.query, "pleural effusion?");
    assert!(first_report.section(DiagnosticReport::CLINICAL_CONTEXT).is_some());
    assert!(second_report.section(DiagnosticReport::CLINICAL_CONTEXT).is_none());
}

#[tokio::test]
async fn undersized_image_is_rejected_before_any_stage() {
    let err = medilens_flow::ImageInput::from_bytes(png_bytes(64, 64), None).unwrap_err();
    assert!(matches!(err, GraphError::Validation(_)));
}
